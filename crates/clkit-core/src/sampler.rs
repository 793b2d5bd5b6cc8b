use crate::{
    context::Context,
    error::{Result, cl_try},
    types::*,
    wrapper::{adopt, cl_wrapper},
};

pub(crate) struct SamplerState {
    context: Context,
}

cl_wrapper!(
    /// Image sampler.
    Sampler, SamplerState, ObjectKind::Sampler, InfoClass::Sampler
);

impl Sampler {
    /// `addressing` is one of `CL_ADDRESS_*`, `filter` one of `CL_FILTER_*`.
    pub fn new(ctx: &Context, normalized_coords: bool, addressing: u32, filter: u32) -> Result<Sampler> {
        let h = cl_try!(
            ctx.driver().create_sampler(ctx.handle(), normalized_coords, addressing, filter),
            "unable to create sampler (addressing {addressing:#x}, filter {filter:#x})"
        );
        let context = ctx.clone();
        Ok(Sampler(adopt(ctx.driver(), ObjectKind::Sampler, h, || SamplerState { context })))
    }

    pub fn context(&self) -> &Context {
        &self.state().context
    }

    pub fn normalized_coords(&self) -> Result<bool> {
        Ok(self.info(CL_SAMPLER_NORMALIZED_COORDS)?.scalar::<u32>()? != 0)
    }

    pub fn addressing_mode(&self) -> Result<u32> {
        self.info(CL_SAMPLER_ADDRESSING_MODE)?.scalar()
    }

    pub fn filter_mode(&self) -> Result<u32> {
        self.info(CL_SAMPLER_FILTER_MODE)?.scalar()
    }
}
