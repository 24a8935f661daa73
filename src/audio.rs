//! Audio contract
//!
//! The simulation only names sound effects; playback lives behind [`AudioSink`].
//! Calls are fire-and-forget. Anything that has to line up with a sound is
//! timed by the simulation's own timers, never by playback completion.

use serde::{Deserialize, Serialize};

/// Sound effect types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SoundEffect {
    /// Level start
    Start,
    /// Cube rotation begins
    Rotate,
    /// Cube pushed toward a stamp
    Stamp,
    /// Piece or stamp filled slots
    Match,
    /// Hit that changed nothing
    Same,
    /// Miss
    Error,
    /// Falling piece accelerated
    Tap,
    /// A face was completed; the payload is the number of filled faces (1-6)
    Fill(u8),
    /// Game won
    Win,
    /// Game lost
    Death,
}

impl SoundEffect {
    /// Face-complete sound for `filled` completed faces
    pub fn fill(filled: usize) -> Self {
        SoundEffect::Fill(filled.clamp(1, 6) as u8)
    }

    /// Asset name a backend can map to a clip
    pub fn asset_name(&self) -> &'static str {
        match self {
            SoundEffect::Start => "start.wav",
            SoundEffect::Rotate => "rotate.wav",
            SoundEffect::Stamp => "stamp.wav",
            SoundEffect::Match => "match.wav",
            SoundEffect::Same => "same.wav",
            SoundEffect::Error => "error.wav",
            SoundEffect::Tap => "tap.wav",
            SoundEffect::Fill(1) => "fill1.wav",
            SoundEffect::Fill(2) => "fill2.wav",
            SoundEffect::Fill(3) => "fill3.wav",
            SoundEffect::Fill(4) => "fill4.wav",
            SoundEffect::Fill(5) => "fill5.wav",
            SoundEffect::Fill(_) => "fill6.wav",
            SoundEffect::Win => "win.wav",
            SoundEffect::Death => "death.wav",
        }
    }
}

/// Playback backend
pub trait AudioSink {
    fn play(&mut self, effect: SoundEffect, looped: bool);

    /// Volume in 0.0 - 1.0
    fn set_volume(&mut self, _volume: f32) {}
}

/// Discards everything
#[derive(Debug, Default)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn play(&mut self, _effect: SoundEffect, _looped: bool) {}
}

/// Keeps every played effect in order (tests, headless runs)
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub played: Vec<SoundEffect>,
    pub volume: f32,
}

impl RecordingSink {
    pub fn count(&self, effect: SoundEffect) -> usize {
        self.played.iter().filter(|e| **e == effect).count()
    }
}

impl AudioSink for RecordingSink {
    fn play(&mut self, effect: SoundEffect, _looped: bool) {
        self.played.push(effect);
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }
}

/// Applies user volume preferences in front of a backend
pub struct AudioManager<S: AudioSink> {
    sink: S,
    master_volume: f32,
    sfx_volume: f32,
    muted: bool,
}

impl<S: AudioSink> AudioManager<S> {
    pub fn new(sink: S) -> Self {
        let mut manager = Self {
            sink,
            master_volume: 0.8,
            sfx_volume: 1.0,
            muted: false,
        };
        manager.apply_volume();
        manager
    }

    /// Set master volume (0.0 - 1.0)
    pub fn set_master_volume(&mut self, vol: f32) {
        self.master_volume = vol.clamp(0.0, 1.0);
        self.apply_volume();
    }

    /// Set sound effects volume (0.0 - 1.0)
    pub fn set_sfx_volume(&mut self, vol: f32) {
        self.sfx_volume = vol.clamp(0.0, 1.0);
        self.apply_volume();
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        self.apply_volume();
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn effective_volume(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.master_volume * self.sfx_volume
        }
    }

    fn apply_volume(&mut self) {
        let volume = self.effective_volume();
        self.sink.set_volume(volume);
    }
}

impl<S: AudioSink> AudioSink for AudioManager<S> {
    fn play(&mut self, effect: SoundEffect, looped: bool) {
        if self.effective_volume() <= 0.0 {
            return;
        }
        self.sink.play(effect, looped);
    }

    fn set_volume(&mut self, volume: f32) {
        self.set_master_volume(volume);
    }
}
