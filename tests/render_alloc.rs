//! Render callback allocation test
//!
//! A counting global allocator is armed only while `MixRenderer::render`
//! runs. Voice starts, finishes, stops and steals must never make the
//! render side allocate or free.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use touchloop::audio::{MixRenderer, SoundAsset, SoundMixer, SoundSink};

struct CountingAlloc;

static ARMED: AtomicBool = AtomicBool::new(false);
static ALLOCS: AtomicUsize = AtomicUsize::new(0);
static FREES: AtomicUsize = AtomicUsize::new(0);

unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if ARMED.load(Ordering::Relaxed) {
            ALLOCS.fetch_add(1, Ordering::Relaxed);
        }
        System.alloc(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if ARMED.load(Ordering::Relaxed) {
            FREES.fetch_add(1, Ordering::Relaxed);
        }
        System.dealloc(ptr, layout)
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if ARMED.load(Ordering::Relaxed) {
            ALLOCS.fetch_add(1, Ordering::Relaxed);
        }
        System.realloc(ptr, layout, new_size)
    }
}

#[global_allocator]
static GLOBAL: CountingAlloc = CountingAlloc;

fn tone(frames: usize) -> Arc<SoundAsset> {
    Arc::new(SoundAsset::from_interleaved("tone", 48_000, 1, &vec![0.1; frames]))
}

/// Render once with the counter armed; returns (allocations, frees).
fn counted_render(renderer: &mut MixRenderer, out: &mut [f32]) -> (usize, usize) {
    ALLOCS.store(0, Ordering::Relaxed);
    FREES.store(0, Ordering::Relaxed);
    ARMED.store(true, Ordering::SeqCst);
    renderer.render(out);
    ARMED.store(false, Ordering::SeqCst);
    (ALLOCS.load(Ordering::Relaxed), FREES.load(Ordering::Relaxed))
}

// Single test so no other test thread allocates while the counter is armed.
#[test]
fn render_never_allocates_or_frees() {
    let mixer = SoundMixer::new(8, 64);
    let mut renderer = mixer.renderer();
    let mut out = vec![0.0f32; 128];

    // Voice that finishes inside the first block.
    mixer.play(tone(32), 1.0);
    assert_eq!(counted_render(&mut renderer, &mut out), (0, 0), "after play");
    assert_eq!(mixer.active_voices(), 0);

    // Several voices finishing across blocks with no control call between.
    for frames in [16, 80, 150, 200] {
        mixer.play(tone(frames), 0.5);
    }
    for _ in 0..4 {
        assert_eq!(counted_render(&mut renderer, &mut out), (0, 0), "finishing voices");
    }
    assert_eq!(mixer.active_voices(), 0);

    // Stop and steal churn: stopped voices and their snapshots are parked.
    let mixer = SoundMixer::new(2, 64);
    let mut renderer = mixer.renderer();
    for round in 0..20 {
        let a = mixer.play(tone(10_000), 1.0);
        mixer.play(tone(10_000), 1.0);
        mixer.play(tone(10_000), 1.0);
        assert_eq!(counted_render(&mut renderer, &mut out), (0, 0), "round {round}");
        mixer.stop(a);
        assert_eq!(counted_render(&mut renderer, &mut out), (0, 0), "round {round} after stop");
    }

    // The last reference to an asset is never dropped on the render side.
    let asset = tone(10_000);
    let weak = Arc::downgrade(&asset);
    let handle = mixer.play(asset, 1.0);
    counted_render(&mut renderer, &mut out);
    mixer.stop(handle);
    assert_eq!(counted_render(&mut renderer, &mut out), (0, 0));
    assert!(weak.upgrade().is_some(), "parked until the control side releases it");
    mixer.stop_all();
    assert!(weak.upgrade().is_none());
}
