use anyhow::anyhow;

use super::*;
use crate::window::{tests::ScriptedHost, wait_while_minimized};

#[derive(Clone, Debug, PartialEq, Eq)]
enum Call {
    Wait(usize),
    Acquire(usize),
    Update(usize),
    Submit(usize, usize),
    Present(usize, usize),
    Recreate,
}

/// Backend that hands out scripted images and records every call.
#[derive(Debug, Default)]
struct MockBackend {
    image_count: usize,
    next_image: usize,
    acquire_script: Vec<AcquireOutcome>,
    present_script: Vec<PresentOutcome>,
    fail_submit: bool,
    host: Option<ScriptedHost>,
    rebuilt_with: Vec<(u32, u32)>,
    calls: Vec<Call>,
}

impl MockBackend {
    fn new(image_count: usize) -> Self {
        Self {
            image_count,
            ..Default::default()
        }
    }

    fn waits(&self) -> Vec<usize> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Wait(slot) => Some(*slot),
                _ => None,
            })
            .collect()
    }

    fn count(&self, call: &Call) -> usize {
        self.calls.iter().filter(|c| *c == call).count()
    }
}

impl FrameBackend for MockBackend {
    fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
        self.calls.push(Call::Wait(slot));
        Ok(())
    }

    fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome> {
        self.calls.push(Call::Acquire(slot));
        if !self.acquire_script.is_empty() {
            return Ok(self.acquire_script.remove(0));
        }
        let index = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count;
        Ok(AcquireOutcome::Acquired(index))
    }

    fn update_uniforms(&mut self, image_index: usize) -> Result<()> {
        self.calls.push(Call::Update(image_index));
        Ok(())
    }

    fn submit(&mut self, slot: usize, image_index: usize) -> Result<()> {
        self.calls.push(Call::Submit(slot, image_index));
        if self.fail_submit {
            return Err(anyhow!("device lost"));
        }
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: usize) -> Result<PresentOutcome> {
        self.calls.push(Call::Present(slot, image_index));
        if !self.present_script.is_empty() {
            return Ok(self.present_script.remove(0));
        }
        Ok(PresentOutcome::Presented)
    }

    fn recreate_swapchain(&mut self) -> Result<usize> {
        self.calls.push(Call::Recreate);
        if let Some(host) = self.host.as_mut() {
            match wait_while_minimized(host) {
                Some(size) => self.rebuilt_with.push(size),
                None => return Ok(self.image_count),
            }
        }
        self.next_image = 0;
        Ok(self.image_count)
    }
}

#[test]
fn two_slots_over_three_images() {
    let mut backend = MockBackend::new(3);
    let mut scheduler = FrameScheduler::new(2, 3);
    let mut resized = false;

    for _ in 0..4 {
        scheduler.draw_frame(&mut backend, &mut resized).unwrap();
    }

    assert_eq!(scheduler.current_frame(), 0);
    assert_eq!(scheduler.image_owners(), &[Some(1), Some(1), Some(0)]);

    // Image 0 was still owned by slot 0 when slot 1 acquired it.
    assert_eq!(backend.waits(), vec![0, 1, 0, 1, 0]);
    assert_eq!(
        &backend.calls[backend.calls.len() - 5..],
        &[
            Call::Acquire(1),
            Call::Wait(0),
            Call::Update(0),
            Call::Submit(1, 0),
            Call::Present(1, 0),
        ]
    );
}

#[test]
fn reacquiring_own_image_does_not_wait_twice() {
    let mut backend = MockBackend::new(2);
    let mut scheduler = FrameScheduler::new(2, 2);
    let mut resized = false;

    for _ in 0..4 {
        scheduler.draw_frame(&mut backend, &mut resized).unwrap();
    }

    // Slot i always gets image i, so only the slot fence is awaited.
    assert_eq!(backend.waits(), vec![0, 1, 0, 1]);
    assert_eq!(scheduler.image_owners(), &[Some(0), Some(1)]);
}

#[test]
fn out_of_date_acquire_skips_the_frame() {
    let mut backend = MockBackend::new(3);
    backend.acquire_script = vec![AcquireOutcome::OutOfDate];
    let mut scheduler = FrameScheduler::new(2, 3);
    let mut resized = false;

    scheduler.draw_frame(&mut backend, &mut resized).unwrap();

    assert_eq!(
        backend.calls,
        vec![Call::Wait(0), Call::Acquire(0), Call::Recreate]
    );
    assert_eq!(scheduler.current_frame(), 0);
    assert_eq!(scheduler.image_owners(), &[None, None, None]);
}

#[test]
fn stale_present_rebuilds_and_advances() {
    let mut backend = MockBackend::new(3);
    backend.present_script = vec![PresentOutcome::Stale];
    let mut scheduler = FrameScheduler::new(2, 3);
    let mut resized = false;

    scheduler.draw_frame(&mut backend, &mut resized).unwrap();

    assert_eq!(backend.count(&Call::Recreate), 1);
    assert_eq!(scheduler.current_frame(), 1);
    assert_eq!(scheduler.image_owners(), &[None, None, None]);
}

#[test]
fn resize_flag_is_handled_once() {
    let mut backend = MockBackend::new(3);
    let mut scheduler = FrameScheduler::new(2, 3);
    let mut resized = true;

    scheduler.draw_frame(&mut backend, &mut resized).unwrap();
    assert!(!resized);
    assert_eq!(backend.count(&Call::Recreate), 1);

    scheduler.draw_frame(&mut backend, &mut resized).unwrap();
    assert_eq!(backend.count(&Call::Recreate), 1);
}

#[test]
fn owner_table_follows_new_image_count() {
    let mut backend = MockBackend::new(2);
    let mut scheduler = FrameScheduler::new(2, 3);
    let mut resized = true;

    scheduler.draw_frame(&mut backend, &mut resized).unwrap();

    assert_eq!(scheduler.image_owners().len(), 2);
}

#[test]
fn minimized_resize_waits_for_a_visible_framebuffer() {
    let mut backend = MockBackend::new(3);
    backend.host = Some(ScriptedHost::new(vec![(0, 0), (0, 0), (0, 0), (640, 480)]));
    let mut scheduler = FrameScheduler::new(2, 3);
    let mut resized = true;

    scheduler.draw_frame(&mut backend, &mut resized).unwrap();

    let host = backend.host.as_ref().unwrap();
    assert_eq!(host.waits, 3);
    assert_eq!(backend.rebuilt_with, vec![(640, 480)]);
    assert!(!resized);
}

#[test]
fn submit_failure_is_fatal() {
    let mut backend = MockBackend::new(3);
    backend.fail_submit = true;
    let mut scheduler = FrameScheduler::new(2, 3);
    let mut resized = false;

    assert!(scheduler.draw_frame(&mut backend, &mut resized).is_err());
    assert_eq!(backend.count(&Call::Present(0, 0)), 0);
}

#[test]
fn closing_while_minimized_skips_the_rebuild() {
    let mut backend = MockBackend::new(3);
    let mut host = ScriptedHost::new(vec![(0, 0)]);
    host.close_after = Some(1);
    backend.host = Some(host);
    let mut scheduler = FrameScheduler::new(2, 3);
    let mut resized = true;

    scheduler.draw_frame(&mut backend, &mut resized).unwrap();

    assert!(backend.rebuilt_with.is_empty());
    assert_eq!(scheduler.image_owners().len(), 3);
    assert!(!resized);
}
