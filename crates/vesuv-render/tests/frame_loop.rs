// SPDX-License-Identifier: CEPL-1.0
use std::collections::VecDeque;

use vesuv_render::{
    AcquireOutcome, FrameBackend, FrameLoop, FramePhase, FrameStatus, PresentOutcome,
    RecreateOutcome, MAX_FRAMES_IN_FLIGHT,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Call {
    Wait(usize),
    Acquire(usize),
    Reset(usize),
    Record { slot: usize, image: u32, draws: usize },
    Submit(usize),
    Present { slot: usize, image: u32 },
    Recreate,
    Idle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Fence {
    Signaled,
    /// Reset; `true` once a submission will signal it.
    Unsignaled(bool),
}

#[derive(Debug, PartialEq, Eq)]
enum MockError {
    Deadlock(usize),
    SubmitRejected,
    DeviceLost,
}

/// Scripted stand-in for the Vulkan presenter. Fences model GPU completion: a
/// submitted slot retires by the time it is next waited on.
struct MockBackend {
    calls: Vec<Call>,
    fences: Vec<Fence>,
    acquires: VecDeque<Result<AcquireOutcome, MockError>>,
    presents: VecDeque<PresentOutcome>,
    /// Number of upcoming rebuilds that find the window minimised.
    minimised_rebuilds: u32,
    reject_submit: bool,
    next_image: u32,
    image_count: u32,
}

impl MockBackend {
    fn new() -> Self {
        Self {
            calls: Vec::new(),
            fences: vec![Fence::Signaled; MAX_FRAMES_IN_FLIGHT],
            acquires: VecDeque::new(),
            presents: VecDeque::new(),
            minimised_rebuilds: 0,
            reject_submit: false,
            next_image: 0,
            image_count: 3,
        }
    }
}

impl FrameBackend for MockBackend {
    type Draw = u32;
    type Pipeline = str;
    type Error = MockError;

    const SLOTS: usize = MAX_FRAMES_IN_FLIGHT;

    fn wait_for_slot(&mut self, slot: usize) -> Result<(), MockError> {
        self.calls.push(Call::Wait(slot));
        match self.fences[slot] {
            Fence::Signaled => Ok(()),
            Fence::Unsignaled(true) => {
                self.fences[slot] = Fence::Signaled;
                Ok(())
            }
            Fence::Unsignaled(false) => Err(MockError::Deadlock(slot)),
        }
    }

    fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome, MockError> {
        self.calls.push(Call::Acquire(slot));
        if let Some(scripted) = self.acquires.pop_front() {
            return scripted;
        }
        let image_index = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count;
        Ok(AcquireOutcome::Acquired {
            image_index,
            suboptimal: false,
        })
    }

    fn reset_slot(&mut self, slot: usize) -> Result<(), MockError> {
        self.calls.push(Call::Reset(slot));
        self.fences[slot] = Fence::Unsignaled(false);
        Ok(())
    }

    fn record(
        &mut self,
        slot: usize,
        image_index: u32,
        _pipeline: &str,
        draws: &[u32],
    ) -> Result<(), MockError> {
        self.calls.push(Call::Record {
            slot,
            image: image_index,
            draws: draws.len(),
        });
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> Result<(), MockError> {
        if self.reject_submit {
            return Err(MockError::SubmitRejected);
        }
        self.calls.push(Call::Submit(slot));
        self.fences[slot] = Fence::Unsignaled(true);
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome, MockError> {
        self.calls.push(Call::Present {
            slot,
            image: image_index,
        });
        Ok(self
            .presents
            .pop_front()
            .unwrap_or(PresentOutcome::Presented))
    }

    fn recreate_swapchain(&mut self) -> Result<RecreateOutcome, MockError> {
        self.calls.push(Call::Recreate);
        if self.minimised_rebuilds > 0 {
            self.minimised_rebuilds -= 1;
            return Ok(RecreateOutcome::Deferred);
        }
        self.next_image = 0;
        Ok(RecreateOutcome::Rebuilt)
    }

    fn wait_idle(&mut self) -> Result<(), MockError> {
        self.calls.push(Call::Idle);
        Ok(())
    }
}

fn frame_loop(backend: MockBackend) -> FrameLoop<MockBackend> {
    FrameLoop::new(backend)
}

#[test]
fn one_frame_follows_the_protocol_order() {
    let mut fl = frame_loop(MockBackend::new());
    let status = fl.draw_frame(&[7, 8], "tri").unwrap();

    assert_eq!(status, FrameStatus::Presented);
    assert_eq!(
        fl.backend().calls,
        vec![
            Call::Wait(0),
            Call::Acquire(0),
            Call::Reset(0),
            Call::Record {
                slot: 0,
                image: 0,
                draws: 2
            },
            Call::Submit(0),
            Call::Present { slot: 0, image: 0 },
        ]
    );
    assert_eq!(fl.current_frame(), 1);
    assert_eq!(fl.context().phase(), FramePhase::Idle);
}

#[test]
fn cursor_round_trips_after_n_frames() {
    let mut fl = frame_loop(MockBackend::new());
    let start = fl.current_frame();
    for _ in 0..MAX_FRAMES_IN_FLIGHT {
        fl.draw_frame(&[], "tri").unwrap();
    }
    assert_eq!(fl.current_frame(), start);
}

#[test]
fn slots_alternate_and_advance_once_per_frame() {
    let mut fl = frame_loop(MockBackend::new());
    for _ in 0..5 {
        fl.draw_frame(&[1], "tri").unwrap();
    }
    let waited: Vec<usize> = fl
        .backend()
        .calls
        .iter()
        .filter_map(|c| match c {
            Call::Wait(slot) => Some(*slot),
            _ => None,
        })
        .collect();
    assert_eq!(waited, vec![0, 1, 0, 1, 0]);
    assert_eq!(fl.current_frame(), 1);
}

#[test]
fn out_of_date_acquire_keeps_slot_and_fence() {
    let mut backend = MockBackend::new();
    backend.acquires.push_back(Ok(AcquireOutcome::OutOfDate));
    let mut fl = frame_loop(backend);

    let status = fl.draw_frame(&[1], "tri").unwrap();
    assert_eq!(status, FrameStatus::Skipped);
    assert_eq!(fl.current_frame(), 0);
    assert_eq!(fl.backend().fences[0], Fence::Signaled);
    assert_eq!(
        fl.backend().calls,
        vec![Call::Wait(0), Call::Acquire(0), Call::Recreate]
    );

    // The retry on the same slot must not block.
    let status = fl.draw_frame(&[1], "tri").unwrap();
    assert_eq!(status, FrameStatus::Presented);
    assert_eq!(fl.current_frame(), 1);
}

#[test]
fn never_waits_on_a_reset_fence_without_a_submit() {
    let mut backend = MockBackend::new();
    backend.acquires.push_back(Ok(AcquireOutcome::OutOfDate));
    backend.presents.extend([
        PresentOutcome::Presented,
        PresentOutcome::Stale,
        PresentOutcome::Presented,
    ]);
    let mut fl = frame_loop(backend);

    for _ in 0..8 {
        fl.notify_resized();
        fl.draw_frame(&[1, 2, 3], "tri")
            .expect("mock reports Deadlock if a reset fence is waited on");
    }
}

#[test]
fn suboptimal_acquire_still_draws() {
    let mut backend = MockBackend::new();
    backend.acquires.push_back(Ok(AcquireOutcome::Acquired {
        image_index: 2,
        suboptimal: true,
    }));
    let mut fl = frame_loop(backend);

    assert_eq!(fl.draw_frame(&[1], "tri").unwrap(), FrameStatus::Presented);
    assert!(fl
        .backend()
        .calls
        .contains(&Call::Present { slot: 0, image: 2 }));
}

#[test]
fn stale_present_recreates_and_advances() {
    let mut backend = MockBackend::new();
    backend.presents.push_back(PresentOutcome::Stale);
    let mut fl = frame_loop(backend);

    assert_eq!(fl.draw_frame(&[1], "tri").unwrap(), FrameStatus::Recreated);
    assert_eq!(fl.backend().calls.last(), Some(&Call::Recreate));
    assert_eq!(fl.current_frame(), 1);
}

#[test]
fn resize_flag_is_consumed_by_one_recreate() {
    let mut fl = frame_loop(MockBackend::new());
    fl.notify_resized();
    assert!(fl.context().resize_pending());

    assert_eq!(fl.draw_frame(&[1], "tri").unwrap(), FrameStatus::Recreated);
    assert!(!fl.context().resize_pending());

    assert_eq!(fl.draw_frame(&[1], "tri").unwrap(), FrameStatus::Presented);
    let recreates = fl
        .backend()
        .calls
        .iter()
        .filter(|c| **c == Call::Recreate)
        .count();
    assert_eq!(recreates, 1);
}

#[test]
fn resize_is_not_consulted_when_acquire_is_out_of_date() {
    let mut backend = MockBackend::new();
    backend.acquires.push_back(Ok(AcquireOutcome::OutOfDate));
    let mut fl = frame_loop(backend);
    fl.notify_resized();

    assert_eq!(fl.draw_frame(&[1], "tri").unwrap(), FrameStatus::Skipped);
    assert!(fl.context().resize_pending());
}

#[test]
fn hook_runs_after_record_before_submit() {
    let mut fl = frame_loop(MockBackend::new());
    fl.draw_frame(&[1], "tri").unwrap();

    let mut seen = None;
    fl.draw_frame_with(&[1], "tri", |slot| seen = Some(slot))
        .unwrap();
    assert_eq!(seen, Some(1));

    // Not invoked when the frame is skipped.
    fl.backend_mut()
        .acquires
        .push_back(Ok(AcquireOutcome::OutOfDate));
    let mut called = false;
    fl.draw_frame_with(&[1], "tri", |_| called = true).unwrap();
    assert!(!called);
}

#[test]
fn hook_observes_slot_in_order() {
    let mut fl = frame_loop(MockBackend::new());
    let mut order = Vec::new();
    fl.draw_frame_with(&[1], "tri", |slot| {
        order.push(slot);
    })
    .unwrap();
    let calls = &fl.backend().calls;
    let record = calls
        .iter()
        .position(|c| matches!(c, Call::Record { .. }))
        .unwrap();
    let submit = calls.iter().position(|c| *c == Call::Submit(0)).unwrap();
    assert!(record < submit);
    assert_eq!(order, vec![0]);
}

#[test]
fn fatal_acquire_error_propagates_without_advancing() {
    let mut backend = MockBackend::new();
    backend.acquires.push_back(Err(MockError::DeviceLost));
    let mut fl = frame_loop(backend);

    assert_eq!(fl.draw_frame(&[1], "tri"), Err(MockError::DeviceLost));
    assert_eq!(fl.current_frame(), 0);
    assert_eq!(fl.context().phase(), FramePhase::Acquiring);

    // The next frame starts over and finishes idle.
    assert_eq!(fl.draw_frame(&[1], "tri"), Ok(FrameStatus::Presented));
    assert_eq!(fl.context().phase(), FramePhase::Idle);
}

#[test]
fn rejected_submit_is_fatal() {
    let mut backend = MockBackend::new();
    backend.reject_submit = true;
    let mut fl = frame_loop(backend);

    assert_eq!(fl.draw_frame(&[1], "tri"), Err(MockError::SubmitRejected));
    assert_eq!(fl.current_frame(), 0);
    assert_eq!(fl.context().phase(), FramePhase::Submitting);
    assert!(!fl
        .backend()
        .calls
        .iter()
        .any(|c| matches!(c, Call::Present { .. })));
}

#[test]
fn cleanup_drains_the_backend() {
    let mut fl = frame_loop(MockBackend::new());
    fl.draw_frame(&[1], "tri").unwrap();
    assert_eq!(fl.cleanup(), Ok(()));
}

#[test]
fn minimised_rebuild_keeps_the_resize_pending() {
    let mut backend = MockBackend::new();
    backend.minimised_rebuilds = 1;
    let mut fl = frame_loop(backend);
    fl.notify_resized();

    assert_eq!(fl.draw_frame(&[1], "tri").unwrap(), FrameStatus::Deferred);
    assert!(fl.context().resize_pending());
    assert_eq!(fl.current_frame(), 1);

    // Window restored: the next frame performs the rebuild and clears the flag.
    assert_eq!(fl.draw_frame(&[1], "tri").unwrap(), FrameStatus::Recreated);
    assert!(!fl.context().resize_pending());
    assert_eq!(fl.draw_frame(&[1], "tri").unwrap(), FrameStatus::Presented);
}

#[test]
fn deferred_rebuild_on_acquire_retries_later() {
    let mut backend = MockBackend::new();
    backend.acquires.push_back(Ok(AcquireOutcome::OutOfDate));
    backend.minimised_rebuilds = 1;
    let mut fl = frame_loop(backend);

    assert_eq!(fl.draw_frame(&[1], "tri").unwrap(), FrameStatus::Skipped);
    assert!(fl.context().resize_pending());
    assert_eq!(fl.backend().fences[0], Fence::Signaled);

    assert_eq!(fl.draw_frame(&[1], "tri").unwrap(), FrameStatus::Recreated);
    let recreates = fl
        .backend()
        .calls
        .iter()
        .filter(|c| **c == Call::Recreate)
        .count();
    assert_eq!(recreates, 2);
}

#[test]
fn phase_is_idle_between_frames() {
    let mut backend = MockBackend::new();
    backend.presents.push_back(PresentOutcome::Stale);
    let mut fl = frame_loop(backend);
    for _ in 0..3 {
        fl.draw_frame(&[1], "tri").unwrap();
        assert_eq!(fl.context().phase(), FramePhase::Idle);
    }
}
