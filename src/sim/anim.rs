//! Keyframe animation scheduler
//!
//! Items are stored by stable handle and advanced in handle order, so a run
//! with the same inputs always delivers callbacks in the same sequence.
//! - Registrations made while a pass is running start advancing next pass
//! - Cancellation is immediate and never fires completion
//! - Completion fires exactly once, synchronously, inside the pass

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Opaque reference to zero-or-one active animation (0 = inactive)
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct AnimHandle(u32);

impl AnimHandle {
    pub const NONE: AnimHandle = AnimHandle(0);

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }

    pub fn is_some(&self) -> bool {
        self.0 != 0
    }
}

/// Interpolation curve of an item
#[derive(Debug, Clone, PartialEq)]
pub enum Curve {
    /// Single pass from start to end
    Linear,
    /// Unclamped linear ramp, never retires on its own
    LinearInfinite,
    /// Keyframe table sampled by fractional index, scaled into [start, end]
    Parametric(Vec<f32>),
    /// No value; fires completion after the duration, or re-arms when repeating
    Timer { repeat: bool },
}

/// A timed animation handed to the scheduler
#[derive(Debug, Clone)]
pub struct AnimItem<T> {
    pub tag: T,
    pub start: f32,
    pub end: f32,
    /// Milliseconds
    pub duration: f32,
    pub curve: Curve,
    /// Playback rate multiplier (jitter effects)
    pub cycle: u32,
}

impl<T> AnimItem<T> {
    pub fn linear(tag: T, start: f32, end: f32, duration: u32) -> Self {
        Self::with_curve(tag, start, end, duration, Curve::Linear)
    }

    pub fn linear_infinite(tag: T, start: f32, end: f32, duration: u32) -> Self {
        Self::with_curve(tag, start, end, duration, Curve::LinearInfinite)
    }

    pub fn parametric(tag: T, start: f32, end: f32, duration: u32, table: &[f32]) -> Self {
        Self::with_curve(tag, start, end, duration, Curve::Parametric(table.to_vec()))
    }

    pub fn timer(tag: T, duration: u32, repeat: bool) -> Self {
        Self::with_curve(tag, 0.0, 0.0, duration, Curve::Timer { repeat })
    }

    /// Speed up playback so the curve runs `cycle` times within the duration
    pub fn cycled(mut self, cycle: u32) -> Self {
        self.cycle = cycle.max(1);
        self
    }

    fn with_curve(tag: T, start: f32, end: f32, duration: u32, curve: Curve) -> Self {
        Self {
            tag,
            start,
            end,
            duration: duration as f32,
            curve,
            cycle: 1,
        }
    }

    fn is_timer(&self) -> bool {
        matches!(self.curve, Curve::Timer { .. })
    }
}

/// Receiver of per-frame values and completions, dispatched by item tag
pub trait AnimTarget<T> {
    /// Called with the interpolated value. Returning `false` retires the item
    /// immediately without a completion callback.
    fn on_frame(&mut self, anims: &mut Scheduler<T>, id: AnimHandle, tag: &T, value: f32) -> bool;

    /// Called once when a non-repeating item reaches its duration
    fn on_complete(&mut self, anims: &mut Scheduler<T>, id: AnimHandle, tag: &T);
}

#[derive(Debug, Clone)]
struct Active<T> {
    item: AnimItem<T>,
    elapsed: f32,
}

enum Step {
    Wait,
    Value { value: f32, done: bool },
    TimerDone,
    TimerRepeat,
}

impl<T> Active<T> {
    fn step(&mut self) -> Step {
        let item = &self.item;
        let duration = item.duration;

        if let Curve::Timer { repeat } = item.curve {
            if self.elapsed < duration {
                return Step::Wait;
            }
            if repeat {
                self.elapsed = if duration > 0.0 {
                    self.elapsed % duration
                } else {
                    0.0
                };
                return Step::TimerRepeat;
            }
            return Step::TimerDone;
        }

        let infinite = item.curve == Curve::LinearInfinite;
        let done = self.elapsed >= duration && !infinite;
        let mut param = if done {
            1.0
        } else {
            item.cycle as f32 * (self.elapsed / duration)
        };
        if param > 1.0 && !infinite {
            param -= param.floor();
        }
        if let Curve::Parametric(table) = &item.curve {
            param = if done {
                table.last().copied().unwrap_or(1.0)
            } else {
                sample_table(table, param)
            };
        }
        Step::Value {
            value: item.start + param * (item.end - item.start),
            done,
        }
    }
}

/// Fractional-index lookup into an N-length table over N-1 equal sub-intervals
pub fn sample_table(table: &[f32], p: f32) -> f32 {
    match table.len() {
        0 => p,
        1 => table[0],
        n => {
            let segments = (n - 1) as f32;
            let pos = p.clamp(0.0, 1.0) * segments;
            let lo = (pos.floor() as usize).min(n - 2);
            let frac = pos - lo as f32;
            table[lo] + (table[lo + 1] - table[lo]) * frac
        }
    }
}

/// Registry of active timed animations
#[derive(Debug, Clone)]
pub struct Scheduler<T> {
    items: BTreeMap<AnimHandle, Active<T>>,
    /// Registered during a pass, merged when the pass ends
    pending: Vec<(AnimHandle, Active<T>)>,
    next_id: u32,
    in_pass: bool,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self {
            items: BTreeMap::new(),
            pending: Vec::new(),
            next_id: 1,
            in_pass: false,
        }
    }

    /// Store an item as active and return its handle
    pub fn register(&mut self, mut item: AnimItem<T>) -> AnimHandle {
        if !item.is_timer() && item.duration <= 0.0 {
            log::warn!("Clamping non-positive animation duration to 1ms");
            item.duration = 1.0;
        }
        item.cycle = item.cycle.max(1);

        let id = AnimHandle(self.next_id);
        self.next_id += 1;
        let active = Active { item, elapsed: 0.0 };
        if self.in_pass {
            self.pending.push((id, active));
        } else {
            self.items.insert(id, active);
        }
        id
    }

    /// Retire an item without completion; no-op on inactive handles
    pub fn cancel(&mut self, id: AnimHandle) {
        if id.is_none() {
            return;
        }
        if self.items.remove(&id).is_none() {
            self.pending.retain(|(pid, _)| *pid != id);
        }
    }

    /// Cancel and reset the owner's handle
    pub fn clear(&mut self, id: &mut AnimHandle) {
        self.cancel(*id);
        *id = AnimHandle::NONE;
    }

    pub fn is_active(&self, id: AnimHandle) -> bool {
        id.is_some() && (self.items.contains_key(&id) || self.pending.iter().any(|(p, _)| *p == id))
    }

    /// Number of live items (including ones waiting for the next pass)
    pub fn len(&self) -> usize {
        self.items.len() + self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every item without callbacks
    pub fn clear_all(&mut self) {
        self.items.clear();
        self.pending.clear();
    }
}

impl<T: Clone> Scheduler<T> {
    pub fn tag(&self, id: AnimHandle) -> Option<T> {
        self.items
            .get(&id)
            .map(|a| a.item.tag.clone())
            .or_else(|| {
                self.pending
                    .iter()
                    .find(|(p, _)| *p == id)
                    .map(|(_, a)| a.item.tag.clone())
            })
    }

    /// Advance every active item by `elapsed` milliseconds
    pub fn advance<H: AnimTarget<T>>(&mut self, elapsed: f32, target: &mut H) {
        self.in_pass = true;

        let ids: Vec<AnimHandle> = self.items.keys().copied().collect();
        for id in ids {
            // May have been cancelled by an earlier callback this pass
            let Some(active) = self.items.get_mut(&id) else {
                continue;
            };
            active.elapsed += elapsed;
            let step = active.step();
            let tag = active.item.tag.clone();

            match step {
                Step::Wait => {}
                Step::Value { value, done } => {
                    if !target.on_frame(self, id, &tag, value) {
                        self.items.remove(&id);
                        continue;
                    }
                    if done && self.items.remove(&id).is_some() {
                        target.on_complete(self, id, &tag);
                    }
                }
                Step::TimerRepeat => {
                    if !target.on_frame(self, id, &tag, 1.0) {
                        self.items.remove(&id);
                    }
                }
                Step::TimerDone => {
                    if self.items.remove(&id).is_some() {
                        target.on_complete(self, id, &tag);
                    }
                }
            }
        }

        self.in_pass = false;
        for (id, active) in self.pending.drain(..) {
            self.items.insert(id, active);
        }
    }
}
