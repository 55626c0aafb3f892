//! Polyphonic voice mixer
//!
//! Control side ([`SoundMixer`]) starts and stops voices from any thread.
//! Render side ([`MixRenderer`]) is owned by the audio thread and only ever
//! holds the voice lock for two short copy loops per block: one to snapshot
//! the voice set, one to commit cursor advances and removals. All mixing
//! arithmetic runs unlocked into buffers allocated up front.
//!
//! Assets released by the render side are parked in a retired list so the
//! final `Arc` drop (and its deallocation) happens on a control thread.
//! Every control-side change leaves at least `max_voices` spare slots in
//! that list, which bounds what one render pass can push.

use std::sync::{Arc, Mutex, MutexGuard};

use super::asset::SoundAsset;
use crate::config::defaults::OUTPUT_CHANNELS;

/// Identifies one playback instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceHandle(u64);

impl VoiceHandle {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

/// Anything that can start and stop sounds.
pub trait SoundSink: Send + Sync {
    fn play(&self, asset: Arc<SoundAsset>, gain: f32) -> VoiceHandle;
    fn stop(&self, handle: VoiceHandle) -> bool;
}

struct Voice {
    id: u64,
    asset: Arc<SoundAsset>,
    /// Next frame to render. Only ever advances.
    cursor: usize,
    gain: f32,
}

struct VoiceTable {
    /// Oldest first.
    voices: Vec<Voice>,
    next_id: u64,
    retired: Vec<Arc<SoundAsset>>,
}

struct MixerShared {
    table: Mutex<VoiceTable>,
    max_voices: usize,
    block_size: usize,
}

impl MixerShared {
    fn lock(&self) -> MutexGuard<'_, VoiceTable> {
        // Never log here: this runs inside the render callback.
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Swap out the retired list for a fresh one with full headroom.
    fn take_retired(&self, table: &mut VoiceTable) -> Vec<Arc<SoundAsset>> {
        std::mem::replace(&mut table.retired, Vec::with_capacity(self.max_voices * 2))
    }

    /// Make room for one render pass worth of retirements.
    fn reserve_headroom(&self, table: &mut VoiceTable) {
        table.retired.reserve(self.max_voices);
    }
}

/// Cloneable control handle for the voice set.
#[derive(Clone)]
pub struct SoundMixer {
    shared: Arc<MixerShared>,
}

impl SoundMixer {
    pub fn new(max_voices: usize, block_size: usize) -> Self {
        let max_voices = max_voices.max(1);
        Self {
            shared: Arc::new(MixerShared {
                table: Mutex::new(VoiceTable {
                    voices: Vec::with_capacity(max_voices),
                    next_id: 1,
                    retired: Vec::with_capacity(max_voices * 2),
                }),
                max_voices,
                block_size: block_size.max(1),
            }),
        }
    }

    /// Create the render side. Call once and move it to the audio thread.
    pub fn renderer(&self) -> MixRenderer {
        let max = self.shared.max_voices;
        let block = self.shared.block_size;
        MixRenderer {
            shared: Arc::clone(&self.shared),
            mix: vec![0.0; block * OUTPUT_CHANNELS],
            scratch: vec![0.0; block * OUTPUT_CHANNELS],
            snapshot: Vec::with_capacity(max),
        }
    }

    pub fn active_voices(&self) -> usize {
        self.shared.lock().voices.len()
    }

    /// Stop every voice.
    pub fn stop_all(&self) {
        let released = {
            let mut table = self.shared.lock();
            let VoiceTable { voices, retired, .. } = &mut *table;
            retired.extend(voices.drain(..).map(|v| v.asset));
            self.shared.take_retired(&mut table)
        };
        drop(released);
    }

    /// Drop assets the render side has parked. Returns how many were released.
    pub fn release_retired(&self) -> usize {
        let released = {
            let mut table = self.shared.lock();
            self.shared.take_retired(&mut table)
        };
        released.len()
    }

    pub fn max_voices(&self) -> usize {
        self.shared.max_voices
    }

    pub fn block_size(&self) -> usize {
        self.shared.block_size
    }
}

impl SoundSink for SoundMixer {
    /// Start a voice, stealing the oldest one when polyphony is exhausted.
    fn play(&self, asset: Arc<SoundAsset>, gain: f32) -> VoiceHandle {
        let (handle, released) = {
            let mut table = self.shared.lock();
            if table.voices.len() >= self.shared.max_voices {
                let stolen = table.voices.remove(0);
                table.retired.push(stolen.asset);
            }
            let id = table.next_id;
            table.next_id += 1;
            table.voices.push(Voice {
                id,
                asset,
                cursor: 0,
                gain,
            });
            let released = self.shared.take_retired(&mut table);
            (VoiceHandle(id), released)
        };
        drop(released);
        handle
    }

    fn stop(&self, handle: VoiceHandle) -> bool {
        let mut table = self.shared.lock();
        match table.voices.iter().position(|v| v.id == handle.0) {
            Some(pos) => {
                let voice = table.voices.remove(pos);
                table.retired.push(voice.asset);
                self.shared.reserve_headroom(&mut table);
                true
            }
            None => false,
        }
    }
}

struct VoiceSlot {
    id: u64,
    asset: Arc<SoundAsset>,
    cursor: usize,
    gain: f32,
}

/// Audio-thread side of the mixer.
pub struct MixRenderer {
    shared: Arc<MixerShared>,
    mix: Vec<f32>,
    scratch: Vec<f32>,
    snapshot: Vec<VoiceSlot>,
}

impl MixRenderer {
    /// Fill `out` (interleaved stereo) with the next frames of the mix.
    ///
    /// Never fails and never blocks beyond the two short voice-lock sections
    /// per block.
    pub fn render(&mut self, out: &mut [f32]) {
        let block_samples = self.mix.len();
        for chunk in out.chunks_mut(block_samples) {
            self.render_block(chunk);
        }
    }

    fn render_block(&mut self, out: &mut [f32]) {
        let frames = out.len() / OUTPUT_CHANNELS;

        {
            let table = self.shared.lock();
            if table.voices.is_empty() {
                out.fill(0.0);
                return;
            }
            for v in &table.voices {
                self.snapshot.push(VoiceSlot {
                    id: v.id,
                    asset: Arc::clone(&v.asset),
                    cursor: v.cursor,
                    gain: v.gain,
                });
            }
        }

        let mix = &mut self.mix[..frames * OUTPUT_CHANNELS];
        mix.fill(0.0);

        for slot in &mut self.snapshot {
            let total = slot.asset.frames();
            let remaining = total.saturating_sub(slot.cursor);
            if remaining == 0 {
                continue;
            }
            let n = remaining.min(frames);
            let src = &slot.asset.samples()
                [slot.cursor * OUTPUT_CHANNELS..(slot.cursor + n) * OUTPUT_CHANNELS];
            let tmp = &mut self.scratch[..n * OUTPUT_CHANNELS];
            for (t, s) in tmp.iter_mut().zip(src) {
                *t = s * slot.gain;
            }
            for (m, t) in mix.iter_mut().zip(tmp.iter()) {
                *m += t;
            }
            slot.cursor += n;
        }

        for (o, m) in out.iter_mut().zip(mix.iter()) {
            *o = m.clamp(-1.0, 1.0);
        }
        // Odd trailing sample (non-stereo buffer length) stays silent.
        for o in out.iter_mut().skip(frames * OUTPUT_CHANNELS) {
            *o = 0.0;
        }

        let mut table = self.shared.lock();
        let VoiceTable { voices, retired, .. } = &mut *table;
        for slot in self.snapshot.drain(..) {
            match voices.iter().position(|v| v.id == slot.id) {
                Some(pos) if slot.cursor >= slot.asset.frames() => {
                    retired.push(voices.remove(pos).asset);
                }
                Some(pos) => {
                    let v = &mut voices[pos];
                    v.cursor = v.cursor.max(slot.cursor);
                }
                // Stopped or stolen mid-block: the control side may already
                // have released its copy, so this one is parked too.
                None => retired.push(slot.asset),
            }
        }
    }
}
