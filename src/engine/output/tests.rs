use std::sync::Arc;
use std::time::{Duration, Instant};

use dpi::PhysicalSize;

use super::machine::{Event, OutputMachine};
use super::{Output, OutputState};
use crate::engine::backend::{GlFactory, SurfaceId};
use crate::engine::config::{OutputSettings, PipelineConfig, Timings};
use crate::engine::flags::{PICTURE_FLAG_DRAIN, PICTURE_FLAG_INTERLACED, PICTURE_FLAG_TOP_FIELD_FIRST};
use crate::engine::picture::{CropRect, DecodedPicture, FrameFormat, FrameInfo, PictureTable, RenderPicture};
use crate::engine::protocol::{
    ControlMessage, ControlPort, ControlReply, ControlSignal, DataEvent, DataMessage, DataPort,
};
use crate::engine::stats::BufferStats;
use crate::engine::surfaces::{SURFACE_USED_FOR_RENDER, SurfaceRegistry};
use crate::engine::test_support::{MockDevice, MockGl, init_logging};

const VIDEO: PhysicalSize<u32> = PhysicalSize::new(1920, 1080);
const OUTPUT: PhysicalSize<u32> = PhysicalSize::new(1280, 720);

fn timings() -> Timings {
    Timings {
        initial: Duration::from_millis(20),
        idle: Duration::from_millis(20),
        busy: Duration::from_millis(2),
        fence_deadline: Duration::from_millis(50),
        fence_poll: Duration::from_millis(2),
        request: Duration::from_millis(2000),
    }
}

struct Harness {
    machine: OutputMachine,
    control: ControlPort,
    data: DataPort,
    device: MockDevice,
    gl: MockGl,
    surfaces: Arc<SurfaceRegistry>,
    stats: Arc<BufferStats>,
    next_pts: u64,
}

impl Harness {
    fn new(pool_size: usize) -> Self {
        init_logging();
        let control = ControlPort::new();
        let data = DataPort::new();
        let device = MockDevice::new();
        let table = Arc::new(PictureTable::new(pool_size, data.out_sender()));
        let machine = OutputMachine::new(
            Arc::new(device.clone()),
            table,
            control.clone(),
            data.clone(),
            timings(),
        );

        let surfaces = Arc::new(SurfaceRegistry::new());
        for id in 1..=12 {
            surfaces.add_surface(SurfaceId(id));
        }

        Self {
            machine,
            control,
            data,
            device,
            gl: MockGl::new(true),
            surfaces,
            stats: Arc::new(BufferStats::new()),
            next_pts: 0,
        }
    }

    fn config(&self, gl_factory: GlFactory) -> PipelineConfig {
        PipelineConfig {
            video_size: VIDEO,
            output_size: OUTPUT,
            surface_size: VIDEO,
            max_references: 2,
            surfaces: self.surfaces.clone(),
            stats: self.stats.clone(),
            gl_factory,
        }
    }

    fn request(&mut self, signal: ControlSignal) -> Option<ControlReply> {
        let (message, reply) = ControlMessage::request(signal);
        self.machine.dispatch(Event::Control(message));
        reply.try_recv().ok()
    }

    fn init_with(&mut self, factory: GlFactory) -> Option<ControlReply> {
        let config = self.config(factory);
        self.request(ControlSignal::Init(Box::new(config)))
    }

    fn init(&mut self) {
        let factory = self.gl.factory();
        assert_eq!(self.init_with(factory), Some(ControlReply::Acc));
        assert_eq!(self.machine.state(), OutputState::ConfiguredIdle);
    }

    /// Codec side of a submission: take a surface, mark RENDER, drop the codec reference.
    fn submit(&mut self) -> SurfaceId {
        let surface = self.surfaces.get_free(None).unwrap();
        assert!(self.surfaces.mark_render(surface));
        self.surfaces.clear_reference(surface);
        self.stats.inc_decoded();
        self.next_pts += 1;
        self.data.send_out(DataMessage::NewFrame(DecodedPicture {
            surface,
            frame: FrameInfo {
                size: VIDEO,
                flags: PICTURE_FLAG_INTERLACED | PICTURE_FLAG_TOP_FIELD_FIRST | PICTURE_FLAG_DRAIN,
                pts: Some(Duration::from_millis(self.next_pts * 40)),
                ..FrameInfo::default()
            },
        }));
        surface
    }

    /// Feeds queued data messages to the machine, in order.
    fn pump(&mut self) {
        while let Some(message) = self.data.try_recv_out() {
            self.machine.dispatch(Event::Data(message));
        }
    }

    fn tick(&mut self) {
        self.pump();
        self.machine.dispatch(Event::Timeout);
        while let Some(event) = self.machine.take_self_trigger() {
            self.machine.dispatch(event);
        }
    }

    fn ticks(&mut self, n: usize) {
        for _ in 0..n {
            self.tick();
        }
    }

    fn pictures(&self) -> Vec<RenderPicture> {
        std::iter::from_fn(|| self.data.try_recv_in())
            .map(|DataEvent::Picture(picture)| picture)
            .collect()
    }

    fn controls(&self) -> Vec<ControlReply> {
        std::iter::from_fn(|| self.control.try_recv_in()).collect()
    }
}

#[test]
fn frames_become_pictures_in_submission_order() {
    let mut h = Harness::new(7);
    h.init();

    let submitted = [h.submit(), h.submit(), h.submit()];
    h.ticks(3);

    let pictures = h.pictures();
    assert_eq!(pictures.len(), 3);
    assert_eq!(h.machine.pool.used_len(), 3);
    assert_eq!(h.machine.pool.free_len(), 4);
    assert!(h.machine.pool.is_conserved());
    assert_eq!(h.device.copies(), submitted.to_vec());

    let pts: Vec<_> = pictures.iter().map(|p| p.info().frame.pts).collect();
    assert_eq!(
        pts,
        vec![
            Some(Duration::from_millis(40)),
            Some(Duration::from_millis(80)),
            Some(Duration::from_millis(120)),
        ]
    );

    let counts = h.stats.get();
    assert_eq!((counts.decoded, counts.processed, counts.render), (0, 0, 3));
}

#[test]
fn processed_picture_carries_output_metadata() {
    let mut h = Harness::new(2);
    h.init();
    let surface = h.submit();
    h.tick();

    let picture = h.pictures().pop().unwrap();
    let info = picture.info();
    assert!(picture.is_valid());
    assert!(picture.texture().is_some());
    assert_eq!(info.frame.size, VIDEO);
    assert_eq!(info.frame.format, FrameFormat::Texture);
    assert_eq!(info.frame.flags, PICTURE_FLAG_DRAIN);
    assert_eq!(info.crop, CropRect::full(OUTPUT));
    assert_eq!(info.texture_size, VIDEO);
    assert_eq!(h.gl.texture_sizes(), vec![VIDEO, VIDEO]);
    assert_eq!(h.surfaces.flags(surface), Some(0));
    assert!(!h.stats.can_skip_deint());
}

#[test]
fn exhausted_pool_waits_for_fenced_return() {
    let mut h = Harness::new(7);
    h.init();

    for _ in 0..7 {
        h.submit();
    }
    h.ticks(7);
    let pictures = h.pictures();
    assert_eq!(pictures.len(), 7);
    assert_eq!(h.machine.pool.free_len(), 0);

    h.submit();
    h.ticks(3);
    assert!(!h.machine.pool.has_work());
    assert_eq!(h.machine.pool.decoded_len(), 1);
    assert!(h.pictures().is_empty());

    let first = &pictures[0];
    first.acquire();
    assert_eq!(first.sync(77), None);
    h.gl.hold_fence(77);
    first.release();

    h.tick();
    assert_eq!(h.controls(), vec![ControlReply::Stats]);
    assert!(!h.machine.pool.has_work());
    assert_eq!(h.machine.timeout(), timings().busy);
    assert!(h.pictures().is_empty());

    h.gl.signal_fence(77);
    h.ticks(2);
    let next = h.pictures();
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].index(), first.index());
    assert_eq!(h.machine.pool.decoded_len(), 0);
    assert_eq!(h.gl.deleted_fences(), vec![77]);
    assert!(h.machine.pool.is_conserved());
}

#[test]
fn copied_frame_hands_its_surface_back_at_once() {
    let mut h = Harness::new(3);
    h.init();
    let surface = h.submit();
    h.pump();
    assert_eq!(h.surfaces.flags(surface), Some(SURFACE_USED_FOR_RENDER));

    h.tick();
    let picture = h.pictures().pop().unwrap();
    let _held = picture.guard();
    assert_eq!(h.surfaces.flags(surface), Some(0));
    assert_eq!(h.surfaces.get_free(Some(surface)), Some(surface));
    assert!(picture.is_valid());
}

#[test]
fn held_pictures_leave_every_surface_free() {
    let mut h = Harness::new(7);
    h.init();
    assert_eq!(h.surfaces.free_count(), 12);

    let submitted: Vec<_> = (0..5).map(|_| h.submit()).collect();
    h.ticks(5);
    let guards: Vec<_> = h.pictures().iter().map(RenderPicture::guard).collect();
    assert_eq!(guards.len(), 5);

    assert_eq!(h.surfaces.free_count(), 12);
    for surface in submitted {
        assert_eq!(h.surfaces.flags(surface), Some(0));
    }
    assert!(guards.iter().all(|guard| guard.is_valid()));
}

#[test]
fn returned_picture_goes_back_to_free() {
    let mut h = Harness::new(3);
    h.init();
    h.submit();
    h.tick();
    let picture = h.pictures().pop().unwrap();

    picture.return_unused();
    h.tick();

    assert!(!picture.is_valid());
    assert_eq!(h.machine.pool.free_len(), 3);
    assert_eq!(h.machine.state(), OutputState::ConfiguredIdle);
}

#[test]
fn stale_handle_cannot_recycle_the_next_occupant() {
    let mut h = Harness::new(2);
    h.init();
    h.submit();
    h.tick();
    let old = h.pictures().pop().unwrap();
    old.acquire();
    old.release();
    h.tick();
    assert_eq!(h.machine.pool.free_len(), 2);

    h.submit();
    h.submit();
    h.ticks(2);
    let pictures = h.pictures();
    let reissued = pictures
        .iter()
        .find(|picture| picture.index() == old.index())
        .unwrap();
    assert!(!old.is_current());

    old.return_unused();
    h.machine
        .dispatch(Event::Data(DataMessage::ReturnPic(old.clone())));
    h.tick();

    assert!(reissued.is_valid());
    assert_eq!(h.machine.pool.used_len(), 2);
    assert_eq!(h.machine.pool.free_len(), 0);
    assert!(h.machine.pool.is_conserved());
}

#[test]
fn failed_context_creation_leaves_machine_in_error() {
    let mut h = Harness::new(7);
    assert_eq!(
        h.init_with(MockGl::failing_factory()),
        Some(ControlReply::Error)
    );
    assert_eq!(h.machine.state(), OutputState::Error);

    h.submit();
    h.ticks(3);
    assert_eq!(h.machine.pool.decoded_len(), 1);
    assert!(h.pictures().is_empty());

    assert_eq!(h.request(ControlSignal::Flush), Some(ControlReply::Error));
}

#[test]
fn failed_pool_allocation_releases_partial_resources() {
    let mut h = Harness::new(4);
    h.device.fail_render_surface(true);
    let factory = h.gl.factory();
    assert_eq!(h.init_with(factory), Some(ControlReply::Error));
    assert_eq!(h.machine.state(), OutputState::Error);
    assert_eq!(h.gl.live_textures(), 0);
}

#[test]
fn unconfigured_machine_never_processes() {
    let mut h = Harness::new(7);
    h.submit();
    h.ticks(3);
    assert_eq!(h.machine.state(), OutputState::Unconfigured);
    assert_eq!(h.machine.pool.decoded_len(), 1);
    assert!(h.pictures().is_empty());

    assert_eq!(h.request(ControlSignal::Flush), Some(ControlReply::Acc));
    assert_eq!(h.request(ControlSignal::PreCleanup), Some(ControlReply::Acc));
}

#[test]
fn flush_drops_queued_frames_and_keeps_held_pictures() {
    let mut h = Harness::new(7);
    h.init();

    h.submit();
    h.tick();
    let held = h.pictures().pop().unwrap();
    held.acquire();

    let queued = [h.submit(), h.submit()];
    h.pump();
    let in_flight = h.submit();
    assert_eq!(h.machine.pool.decoded_len(), 2);

    assert_eq!(h.request(ControlSignal::Flush), Some(ControlReply::Acc));
    assert_eq!(h.machine.pool.decoded_len(), 0);
    for surface in queued.into_iter().chain([in_flight]) {
        assert_eq!(h.surfaces.flags(surface), Some(0));
    }
    assert!(held.is_valid());
    assert_eq!(held.ref_count(), 1);
    assert_eq!(h.machine.pool.used_len(), 1);
}

#[test]
fn flush_pulls_back_untaken_pictures() {
    let mut h = Harness::new(4);
    h.init();
    let surface = h.submit();
    h.tick();

    assert_eq!(h.request(ControlSignal::Flush), Some(ControlReply::Acc));
    assert!(h.pictures().is_empty());
    assert_eq!(h.machine.pool.free_len(), 4);
    assert_eq!(h.surfaces.flags(surface), Some(0));
    assert_eq!(h.stats.get().render, 0);
}

#[test]
fn pre_cleanup_releases_only_unreferenced_pictures() {
    let mut h = Harness::new(4);
    h.init();
    assert_eq!(h.gl.live_textures(), 4);

    h.submit();
    h.tick();
    let held = h.pictures().pop().unwrap();
    held.acquire();

    assert_eq!(h.request(ControlSignal::PreCleanup), Some(ControlReply::Acc));
    assert_eq!(h.gl.live_textures(), 1);
    assert_eq!(h.device.live_render_surfaces(), 1);
    assert!(held.texture().is_some());

    h.submit();
    h.tick();
    let recreated = h.pictures().pop().unwrap();
    assert!(recreated.texture().is_some());
    assert_eq!(h.gl.live_textures(), 2);
}

#[test]
fn copy_failure_moves_to_error_and_reports() {
    let mut h = Harness::new(3);
    h.init();
    h.device.fail_copy(true);

    let surface = h.submit();
    h.tick();

    assert_eq!(h.machine.state(), OutputState::Error);
    assert_eq!(h.controls(), vec![ControlReply::Error]);
    assert!(h.pictures().is_empty());
    assert_eq!(h.surfaces.flags(surface), Some(0));
    assert_eq!(h.machine.pool.free_len(), 3);
    assert_eq!(h.stats.get().processed, 0);
    assert_eq!(h.request(ControlSignal::PreCleanup), Some(ControlReply::Error));
}

#[test]
fn unhandled_request_fails_fast() {
    let mut h = Harness::new(2);
    h.init();

    let config = h.config(h.gl.factory());
    let (message, reply) = ControlMessage::request(ControlSignal::Init(Box::new(config)));
    h.machine.dispatch(Event::Control(message));
    assert_eq!(
        reply.recv_timeout(Duration::from_millis(10)),
        Err(crossbeam_channel::RecvTimeoutError::Disconnected)
    );
    assert_eq!(h.machine.state(), OutputState::ConfiguredIdle);
}

#[test]
fn teardown_abandons_fence_that_never_signals() {
    let mut h = Harness::new(3);
    h.init();
    h.submit();
    h.tick();

    let picture = h.pictures().pop().unwrap();
    picture.acquire();
    picture.sync(99);
    h.gl.hold_fence(99);
    picture.release();
    h.pump();
    assert_eq!(h.machine.pool.sync_pending_len(), 1);

    let started = Instant::now();
    h.machine.flush();
    h.machine.uninit();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(h.gl.deleted_fences(), vec![99]);
    assert_eq!(h.gl.live_textures(), 0);
    assert_eq!(h.device.live_render_surfaces(), 0);
    assert!(h.gl.flushes() >= 1);
}

/// Output thread with its own mocks and eight registered surfaces.
struct Threaded {
    output: Output,
    device: MockDevice,
    gl: MockGl,
    surfaces: Arc<SurfaceRegistry>,
}

impl Threaded {
    fn start(pool_size: usize) -> Self {
        init_logging();
        let device = MockDevice::new();
        let gl = MockGl::new(true);
        let surfaces = Arc::new(SurfaceRegistry::new());
        for id in 1..=8 {
            surfaces.add_surface(SurfaceId(id));
        }

        let output = Output::start(
            Arc::new(device.clone()),
            OutputSettings {
                pool_size,
                timings: timings(),
                thread_name: "output-test".to_string(),
            },
        )
        .unwrap();
        output
            .init(PipelineConfig {
                video_size: VIDEO,
                output_size: OUTPUT,
                surface_size: VIDEO,
                max_references: 2,
                surfaces: surfaces.clone(),
                stats: Arc::new(BufferStats::new()),
                gl_factory: gl.factory(),
            })
            .unwrap();

        Self {
            output,
            device,
            gl,
            surfaces,
        }
    }

    fn submit(&self) -> SurfaceId {
        let surface = self.surfaces.get_free(None).unwrap();
        self.surfaces.mark_render(surface);
        self.surfaces.clear_reference(surface);
        self.output.submit_frame(DecodedPicture {
            surface,
            frame: FrameInfo::default(),
        });
        surface
    }

    fn receive(&self) -> RenderPicture {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if let Some(picture) = self.output.try_receive_picture() {
                return picture;
            }
            assert!(Instant::now() < deadline, "no picture from output thread");
            self.output.wait_for_message(Duration::from_millis(50));
        }
    }
}

#[test]
fn threaded_output_round_trip() {
    let mut t = Threaded::start(3);
    let surface = t.submit();
    let picture = t.receive();

    {
        let _guard = picture.guard();
        assert_eq!(t.output.outstanding_pictures(), 1);
    }
    assert_eq!(t.output.outstanding_pictures(), 0);
    t.output.flush().unwrap();

    t.output.dispose();
    assert!(t.output.is_disposed());
    assert_eq!(t.gl.live_textures(), 0);
    assert_eq!(t.device.live_render_surfaces(), 0);
    assert_eq!(t.surfaces.flags(surface), Some(0));
}

#[test]
fn held_picture_outlives_output_drop() {
    let mut t = Threaded::start(2);
    t.submit();
    let picture = t.receive();
    let guard = picture.guard();
    let textures = t.gl.live_textures();
    assert_eq!(textures, 2);

    let queued = t.submit();
    t.output.dispose();
    assert!(!t.output.is_disposed());
    assert_eq!(t.surfaces.flags(queued), Some(0));

    let Threaded {
        output, device, gl, ..
    } = t;
    drop(output);
    assert_eq!(guard.ref_count(), 1);
    assert!(guard.is_valid());
    assert!(guard.texture().is_some());
    assert_eq!(gl.live_textures(), textures);

    drop(guard);
    assert_eq!(gl.live_textures(), 0);
    assert_eq!(device.live_render_surfaces(), 0);
    assert!(!picture.is_valid());
    assert_eq!(picture.texture(), None);
}

#[test]
fn lazy_texture_recreation_failure_is_a_gpu_error() {
    let mut h = Harness::new(2);
    h.init();
    assert_eq!(h.request(ControlSignal::PreCleanup), Some(ControlReply::Acc));
    assert_eq!(h.gl.live_textures(), 0);

    h.gl.fail_texture(true);
    let surface = h.submit();
    h.tick();

    assert_eq!(h.machine.state(), OutputState::Error);
    assert_eq!(h.controls(), vec![ControlReply::Error]);
    assert_eq!(h.surfaces.flags(surface), Some(0));
    assert!(h.machine.pool.is_conserved());
}
