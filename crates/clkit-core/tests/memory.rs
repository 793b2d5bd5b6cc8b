use std::sync::Arc;

use clkit_core::{
    Buffer, ClError, Context, Driver, Image, ImageDesc, ImageFormat, ImageRegion, MemObject, Queue, RawHandle, Rect, RectSide,
    Sampler, StubDriver,
    driver::stub::DeviceSpec,
    types::*,
};

fn setup(stub: Arc<StubDriver>) -> (Arc<StubDriver>, Context, Queue) {
    let driver: Arc<dyn Driver> = stub.clone();
    let ctx = Context::new_gpu(&driver).unwrap();
    let queue = Queue::new(&ctx, None, 0).unwrap();
    (stub, ctx, queue)
}

fn rgba8() -> ImageFormat {
    ImageFormat::new(CL_RGBA, CL_UNSIGNED_INT8)
}

#[test]
fn buffer_write_read_copy() {
    let (stub, ctx, q) = setup(StubDriver::single_gpu());
    let src = Buffer::from_slice(&ctx, CL_MEM_READ_WRITE, &[1i32, 2, 3, 4]).unwrap();
    assert_eq!(src.size().unwrap(), 16);
    assert!(src.flags().unwrap() & CL_MEM_COPY_HOST_PTR != 0);

    src.enqueue_write(&q, 8, &[30i32, 40], None).unwrap();
    let mut out = [0i32; 4];
    src.enqueue_read(&q, 0, &mut out, None).unwrap();
    assert_eq!(out, [1, 2, 30, 40]);

    let dst = Buffer::new(&ctx, CL_MEM_READ_WRITE, 16, None).unwrap();
    src.enqueue_copy(&q, &dst, 4, 0, 8, None).unwrap();
    let bytes = stub.buffer_contents(dst.handle()).unwrap();
    assert_eq!(&bytes[..8], bytemuck::cast_slice::<i32, u8>(&[2, 30]));
    assert_eq!(q.num_events(), 3);
}

#[test]
fn async_transfers() {
    let (_stub, ctx, q) = setup(StubDriver::single_gpu());
    let buf = Buffer::new(&ctx, CL_MEM_READ_WRITE, 8, None).unwrap();
    let src = [7u32, 9];
    // SAFETY: the buffers outlive the events, which are waited on.
    let ev = unsafe { buf.enqueue_write_async(&q, 0, &src, None) }.unwrap();
    ev.wait().unwrap();
    let mut dst = [0u32; 2];
    let ev = unsafe { buf.enqueue_read_async(&q, 0, &mut dst, None) }.unwrap();
    ev.wait().unwrap();
    assert_eq!(dst, src);
}

#[test]
fn out_of_range_transfers_never_reach_the_driver() {
    let (stub, ctx, q) = setup(StubDriver::single_gpu());
    let buf = Buffer::new(&ctx, CL_MEM_READ_WRITE, 16, None).unwrap();
    stub.clear_calls();
    let mut big = [0i32; 5];
    assert!(matches!(buf.enqueue_read(&q, 0, &mut big, None), Err(ClError::InvalidArgument(_))));
    assert!(matches!(buf.enqueue_write(&q, 12, &[1i32, 2], None), Err(ClError::InvalidArgument(_))));
    assert!(matches!(buf.enqueue_read(&q, usize::MAX, &mut [0u8; 2], None), Err(ClError::InvalidArgument(_))));
    assert!(!stub.calls().iter().any(|c| matches!(c, clkit_core::driver::stub::Call::Enqueue { .. })));
    assert_eq!(q.num_events(), 0);
    assert!(matches!(Buffer::new(&ctx, CL_MEM_READ_WRITE, 0, None), Err(ClError::InvalidArgument(_))));
}

#[test]
fn fill_and_migrate_need_opencl_1_2() {
    let (stub, ctx, q) = setup(StubDriver::single_gpu());
    let buf = Buffer::new(&ctx, CL_MEM_READ_WRITE, 16, None).unwrap();
    buf.enqueue_fill(&q, &0xABu8, 4, 8, None).unwrap();
    let bytes = stub.buffer_contents(buf.handle()).unwrap();
    assert_eq!(&bytes[..], &[0, 0, 0, 0, 0xAB, 0xAB, 0xAB, 0xAB, 0xAB, 0xAB, 0xAB, 0xAB, 0, 0, 0, 0]);
    MemObject::enqueue_migrate(&q, &[buf.clone().into()], CL_MIGRATE_MEM_OBJECT_HOST, None).unwrap();

    let (_stub, ctx, q) = setup(legacy_driver());
    let buf = Buffer::new(&ctx, CL_MEM_READ_WRITE, 16, None).unwrap();
    match buf.enqueue_fill(&q, &1u32, 0, 16, None) {
        Err(ClError::UnsupportedVersion { required: 120, found: 110, .. }) => {}
        other => panic!("unexpected {other:?}"),
    }
    let res = MemObject::enqueue_migrate(&q, &[buf.into()], 0, None);
    assert!(matches!(res, Err(ClError::UnsupportedVersion { required: 120, found: 110, .. })));
    assert_eq!(q.num_events(), 0);
}

fn legacy_driver() -> Arc<StubDriver> {
    StubDriver::builder().platform("Old", "Old Vendor", "OpenCL 1.1 old").device(DeviceSpec::gpu("Old GPU")).build()
}

#[test]
fn sub_buffer_is_a_window_on_its_parent() {
    let (stub, ctx, q) = setup(StubDriver::single_gpu());
    let bytes: Vec<u8> = (0..=255).collect();
    let parent = Buffer::from_slice(&ctx, CL_MEM_READ_WRITE, &bytes).unwrap();
    let sub = parent.sub_buffer(0, 128, 64).unwrap();
    assert_eq!(sub.size().unwrap(), 64);
    assert_eq!(sub.flags().unwrap(), parent.flags().unwrap());
    assert_eq!(sub.origin(), 128);
    assert_eq!(sub.parent(), Some(&parent));
    assert!(parent.parent().is_none());
    assert_eq!(parent.origin(), 0);
    assert_eq!(sub.info(CL_MEM_ASSOCIATED_MEMOBJECT).unwrap().scalar::<RawHandle>().unwrap(), parent.handle());
    assert_eq!(sub.info(CL_MEM_OFFSET).unwrap().scalar::<usize>().unwrap(), 128);

    let mut head = [0u8; 4];
    sub.enqueue_read(&q, 0, &mut head, None).unwrap();
    assert_eq!(head, [128, 129, 130, 131]);
    sub.enqueue_write(&q, 4, &[0xaau8; 4], None).unwrap();
    assert_eq!(&stub.buffer_contents(parent.handle()).unwrap()[130..138], &[130, 131, 0xaa, 0xaa, 0xaa, 0xaa, 136, 137]);
    assert!(matches!(sub.enqueue_read(&q, 60, &mut [0u8; 8], None), Err(ClError::InvalidArgument(_))));
}

#[test]
fn sub_buffer_rejections() {
    let (_stub, ctx, _q) = setup(StubDriver::single_gpu());
    let parent = Buffer::new(&ctx, CL_MEM_READ_WRITE, 256, None).unwrap();
    let err = parent.sub_buffer(0, 4, 16).unwrap_err();
    assert!(err.is_driver(CL_MISALIGNED_SUB_BUFFER_OFFSET), "{err}");
    assert!(matches!(parent.sub_buffer(0, 128, 256), Err(ClError::InvalidArgument(_))));
    assert!(matches!(parent.sub_buffer(0, 0, 0), Err(ClError::InvalidArgument(_))));
    let sub = parent.sub_buffer(CL_MEM_READ_ONLY, 0, 128).unwrap();
    assert_eq!(sub.flags().unwrap(), CL_MEM_READ_ONLY);
    assert!(matches!(sub.sub_buffer(0, 0, 16), Err(ClError::InvalidArgument(_))));

    let old = StubDriver::builder().platform("Older", "Old Vendor", "OpenCL 1.0 old").device(DeviceSpec::gpu("Old GPU")).build();
    let (_stub, ctx, _q) = setup(old);
    let parent = Buffer::new(&ctx, CL_MEM_READ_WRITE, 256, None).unwrap();
    assert!(matches!(parent.sub_buffer(0, 0, 16), Err(ClError::UnsupportedVersion { required: 110, found: 100, .. })));
}

#[test]
fn sub_buffer_keeps_its_parent_alive() {
    let (stub, ctx, _q) = setup(StubDriver::single_gpu());
    let parent = Buffer::new(&ctx, CL_MEM_READ_WRITE, 256, None).unwrap();
    let sub = parent.sub_buffer(0, 128, 128).unwrap();
    let (ph, sh) = (parent.handle(), sub.handle());
    drop(parent);
    assert!(stub.is_live(ph));
    assert_eq!(sub.parent().map(Buffer::handle), Some(ph));
    drop(sub);
    assert!(!stub.is_live(sh));
    assert!(!stub.is_live(ph));
}

#[test]
fn rect_transfers_honour_both_pitches() {
    let (stub, ctx, q) = setup(StubDriver::single_gpu());
    // 4x3 bytes, rows 4 apart.
    let buf = Buffer::new(&ctx, CL_MEM_READ_WRITE, 12, None).unwrap();
    let host = [1u8, 2, 9, 3, 4, 9];
    let to_buffer = Rect::new([2, 2, 1])
        .src(RectSide::new([0, 0, 0]).with_pitches(3, 0))
        .dst(RectSide::new([1, 1, 0]).with_pitches(4, 0));
    buf.enqueue_write_rect(&q, &to_buffer, &host, None).unwrap();
    assert_eq!(stub.buffer_contents(buf.handle()).unwrap(), vec![0, 0, 0, 0, 0, 1, 2, 0, 0, 3, 4, 0]);

    let from_buffer = Rect::new([2, 2, 1]).src(RectSide::new([1, 1, 0]).with_pitches(4, 0));
    let mut packed = [0u8; 4];
    buf.enqueue_read_rect(&q, &from_buffer, &mut packed, None).unwrap();
    assert_eq!(packed, [1, 2, 3, 4]);

    let dst = Buffer::new(&ctx, CL_MEM_READ_WRITE, 8, None).unwrap();
    let shift = from_buffer.dst(RectSide::new([0, 1, 0]).with_pitches(2, 0));
    buf.enqueue_copy_rect(&q, &dst, &shift, None).unwrap();
    assert_eq!(stub.buffer_contents(dst.handle()).unwrap(), vec![0, 0, 1, 2, 3, 4, 0, 0]);

    let final_names: Vec<String> = q.events().iter().map(|e| e.final_name().unwrap()).collect();
    assert_eq!(final_names, vec!["WRITE_BUFFER_RECT", "READ_BUFFER_RECT", "COPY_BUFFER_RECT"]);
}

#[test]
fn rect_boxes_must_fit_both_sides() {
    let (_stub, ctx, q) = setup(StubDriver::single_gpu());
    let buf = Buffer::new(&ctx, CL_MEM_READ_WRITE, 12, None).unwrap();
    let tall = Rect::new([2, 4, 1]).src(RectSide::new([0, 0, 0]).with_pitches(4, 0));
    assert!(matches!(buf.enqueue_read_rect(&q, &tall, &mut [0u8; 8], None), Err(ClError::InvalidArgument(_))));
    let short_host = Rect::new([2, 2, 1]);
    assert!(matches!(buf.enqueue_write_rect(&q, &short_host, &[0u8; 3], None), Err(ClError::InvalidArgument(_))));
    let narrow = Rect::new([2, 2, 1]).dst(RectSide::new([0, 0, 0]).with_pitches(1, 0));
    assert!(matches!(buf.enqueue_write_rect(&q, &narrow, &[0u8; 4], None), Err(ClError::InvalidArgument(_))));
    let empty = Rect::new([0, 1, 1]);
    assert!(matches!(buf.enqueue_copy_rect(&q, &buf, &empty, None), Err(ClError::InvalidArgument(_))));
    assert_eq!(q.num_events(), 0);

    let old = StubDriver::builder().platform("Older", "Old Vendor", "OpenCL 1.0 old").device(DeviceSpec::gpu("Old GPU")).build();
    let (_stub, ctx, q) = setup(old);
    let buf = Buffer::new(&ctx, CL_MEM_READ_WRITE, 12, None).unwrap();
    let res = buf.enqueue_read_rect(&q, &Rect::new([2, 2, 1]), &mut [0u8; 4], None);
    assert!(matches!(res, Err(ClError::UnsupportedVersion { required: 110, found: 100, .. })));
}

#[test]
fn buffer_map_and_unmap() {
    let (stub, ctx, q) = setup(StubDriver::single_gpu());
    let buf = Buffer::from_slice(&ctx, CL_MEM_READ_WRITE, &[0u8; 16]).unwrap();
    let (_ev, mut mapped) = buf.enqueue_map(&q, true, CL_MAP_WRITE, 4, 4, None).unwrap();
    assert_eq!(mapped.size, 4);
    assert!(!mapped.as_ptr().is_null());
    // SAFETY: blocking map of 4 bytes; nothing else touches the buffer.
    unsafe { mapped.as_mut_slice::<u8>(4) }.copy_from_slice(&[1, 2, 3, 4]);
    MemObject::from(buf.clone()).enqueue_unmap(&q, mapped, None).unwrap();
    assert_eq!(&stub.buffer_contents(buf.handle()).unwrap()[..8], &[0, 0, 0, 0, 1, 2, 3, 4]);

    let final_names: Vec<String> = q.events().iter().map(|e| e.final_name().unwrap()).collect();
    assert_eq!(final_names, vec!["MAP_BUFFER", "UNMAP_MEM_OBJECT"]);
}

#[test]
fn image_write_read_region() {
    let (_stub, ctx, q) = setup(StubDriver::single_gpu());
    let img = Image::new(&ctx, CL_MEM_READ_WRITE, &rgba8(), &ImageDesc::image2d(4, 2), None).unwrap();
    assert_eq!(img.format().unwrap(), rgba8());
    assert_eq!(img.element_size().unwrap(), 4);
    assert_eq!((img.width().unwrap(), img.height().unwrap()), (4, 2));
    assert_eq!(img.size().unwrap(), 32);

    let pixels: Vec<u8> = (0..32).collect();
    img.enqueue_write(&q, &ImageRegion::new([0, 0, 0], [4, 2, 1]), &pixels, None).unwrap();
    let mut out = [0u8; 8];
    img.enqueue_read(&q, &ImageRegion::new([1, 1, 0], [2, 1, 1]), &mut out, None).unwrap();
    assert_eq!(out, [20, 21, 22, 23, 24, 25, 26, 27]);

    // Rows land 12 bytes apart on the host.
    let mut pitched = [0xffu8; 20];
    img.enqueue_read(&q, &ImageRegion::new([0, 0, 0], [2, 2, 1]).with_pitches(12, 0), &mut pitched, None).unwrap();
    assert_eq!(pitched[..8], [0, 1, 2, 3, 4, 5, 6, 7]);
    assert_eq!(pitched[8..12], [0xff; 4]);
    assert_eq!(pitched[12..], [16, 17, 18, 19, 20, 21, 22, 23]);

    let mut small = [0u8; 4];
    assert!(matches!(
        img.enqueue_read(&q, &ImageRegion::new([0, 0, 0], [2, 1, 1]), &mut small, None),
        Err(ClError::InvalidArgument(_))
    ));
}

#[test]
fn image_fill_copy_and_map() {
    let (stub, ctx, q) = setup(StubDriver::single_gpu());
    let img = Image::new(&ctx, CL_MEM_READ_WRITE, &rgba8(), &ImageDesc::image2d(4, 2), None).unwrap();
    img.enqueue_fill(&q, &[9u32, 8, 7, 6], [0, 0, 0], [1, 1, 1], None).unwrap();
    assert_eq!(&stub.buffer_contents(img.handle()).unwrap()[..8], &[9, 8, 7, 6, 0, 0, 0, 0]);

    let other = Image::new(&ctx, CL_MEM_READ_WRITE, &rgba8(), &ImageDesc::image2d(4, 2), None).unwrap();
    img.enqueue_copy(&q, &other, [0, 0, 0], [3, 1, 0], [1, 1, 1], None).unwrap();
    assert_eq!(&stub.buffer_contents(other.handle()).unwrap()[28..], &[9, 8, 7, 6]);

    let staging = Buffer::from_slice(&ctx, CL_MEM_READ_WRITE, &[1u8, 2, 3, 4, 5, 6, 7, 8]).unwrap();
    staging.enqueue_copy_to_image(&q, &img, 0, [0, 1, 0], [2, 1, 1], None).unwrap();
    let back = Buffer::new(&ctx, CL_MEM_READ_WRITE, 16, None).unwrap();
    img.enqueue_copy_to_buffer(&q, &back, [0, 1, 0], [4, 1, 1], 0, None).unwrap();
    assert_eq!(&stub.buffer_contents(back.handle()).unwrap()[..8], &[1, 2, 3, 4, 5, 6, 7, 8]);

    let (_ev, mut mapped) = img.enqueue_map(&q, true, CL_MAP_READ, [0, 1, 0], [4, 1, 1], None).unwrap();
    assert_eq!(mapped.row_pitch, 16);
    assert_eq!(mapped.size, 16);
    // SAFETY: blocking map covering one 16-byte row.
    let row = unsafe { mapped.as_mut_slice::<u8>(16) }.to_vec();
    assert_eq!(&row[..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
    MemObject::Image(img).enqueue_unmap(&q, mapped, None).unwrap();
}

#[test]
fn zero_width_image_is_rejected() {
    let (_stub, ctx, _q) = setup(StubDriver::single_gpu());
    let res = Image::new(&ctx, CL_MEM_READ_ONLY, &rgba8(), &ImageDesc::image2d(0, 4), None);
    assert!(matches!(res, Err(ClError::InvalidArgument(_))));
}

#[test]
fn sampler_properties() {
    let (_stub, ctx, _q) = setup(StubDriver::single_gpu());
    let s = Sampler::new(&ctx, true, CL_ADDRESS_CLAMP_TO_EDGE, CL_FILTER_LINEAR).unwrap();
    assert!(s.normalized_coords().unwrap());
    assert_eq!(s.addressing_mode().unwrap(), CL_ADDRESS_CLAMP_TO_EDGE);
    assert_eq!(s.filter_mode().unwrap(), CL_FILTER_LINEAR);
    assert_eq!(s.context(), &ctx);
}

#[test]
fn mem_object_wraps_both_kinds() {
    let (_stub, ctx, _q) = setup(StubDriver::single_gpu());
    let buf = Buffer::new(&ctx, CL_MEM_READ_WRITE, 12, None).unwrap();
    let img = Image::new(&ctx, CL_MEM_READ_WRITE, &ImageFormat::new(CL_R, CL_FLOAT), &ImageDesc::image2d(2, 2), None).unwrap();
    let mems: Vec<MemObject> = vec![buf.clone().into(), img.clone().into()];
    assert_eq!(mems[0].handle(), buf.handle());
    assert_eq!(mems[1].size().unwrap(), 16);
    assert_eq!(mems[1].context(), &ctx);
}
