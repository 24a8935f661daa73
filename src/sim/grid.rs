//! Face grids, slots and piece templates
//!
//! A face grid is a square of `dimen × dimen` slots stored row-major. The slot
//! permutation tables here are shared by face rotation (cube turns), piece
//! orientation randomizing and stamp mirroring.

use glam::Vec4;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::sim::anim::AnimHandle;

/// RGBA color
pub type Color = Vec4;

pub const BLACK: Color = Vec4::new(0.0, 0.0, 0.0, 1.0);
pub const WHITE: Color = Vec4::new(1.0, 1.0, 1.0, 1.0);

/// Orientation axis of a face, piece or stamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// Launch order used when a level prunes directions
    pub const LAUNCH_ORDER: [Axis; 3] = [Axis::Z, Axis::X, Axis::Y];
    /// Order used by bursts and stamps
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Component index into a `Vec3` (x = 0, y = 1, z = 2)
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Axis::X => "X",
            Axis::Y => "Y",
            Axis::Z => "Z",
        }
    }
}

/// Fill classification of a face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillState {
    Empty,
    Partial,
    Filled,
}

pub fn is_valid_dimension(dimen: usize) -> bool {
    (1..=3).contains(&dimen)
}

// 4-cycles (a, b, c, d): a→b, b→c, c→d, d→a
const CYCLES_2_CW: [[usize; 4]; 1] = [[0, 2, 3, 1]];
const CYCLES_2_CCW: [[usize; 4]; 1] = [[0, 1, 3, 2]];
const CYCLES_3_CW: [[usize; 4]; 2] = [[0, 6, 8, 2], [1, 3, 7, 5]];
const CYCLES_3_CCW: [[usize; 4]; 2] = [[0, 2, 8, 6], [1, 5, 7, 3]];

const HALF_TURN_2: [(usize, usize); 2] = [(0, 3), (1, 2)];
const HALF_TURN_3: [(usize, usize); 4] = [(0, 8), (1, 7), (2, 6), (3, 5)];

const MIRROR_COLS_2: [(usize, usize); 2] = [(0, 1), (2, 3)];
const MIRROR_COLS_3: [(usize, usize); 3] = [(0, 2), (3, 5), (6, 8)];
const MIRROR_ROWS_2: [(usize, usize); 2] = [(0, 2), (1, 3)];
const MIRROR_ROWS_3: [(usize, usize); 3] = [(0, 6), (1, 7), (2, 8)];

/// Slot 4-cycles for a quarter turn. Corners and edges rotate independently on 3×3.
pub fn quarter_turn_cycles(dimen: usize, cw: bool) -> &'static [[usize; 4]] {
    match (dimen, cw) {
        (2, true) => &CYCLES_2_CW,
        (2, false) => &CYCLES_2_CCW,
        (3, true) => &CYCLES_3_CW,
        (3, false) => &CYCLES_3_CCW,
        _ => &[],
    }
}

fn half_turn_pairs(dimen: usize) -> &'static [(usize, usize)] {
    match dimen {
        2 => &HALF_TURN_2,
        3 => &HALF_TURN_3,
        _ => &[],
    }
}

fn mirror_pairs(dimen: usize, axis: Axis) -> &'static [(usize, usize)] {
    match (dimen, axis) {
        (2, Axis::Y) => &MIRROR_ROWS_2,
        (3, Axis::Y) => &MIRROR_ROWS_3,
        (2, _) => &MIRROR_COLS_2,
        (3, _) => &MIRROR_COLS_3,
        _ => &[],
    }
}

fn cycle4<T: Copy>(v: &mut [T], [a, b, c, d]: [usize; 4]) {
    let tmp = v[d];
    v[d] = v[c];
    v[c] = v[b];
    v[b] = v[a];
    v[a] = tmp;
}

/// Rotate a row-major slot array a quarter turn in place
pub fn quarter_turn<T: Copy>(v: &mut [T], dimen: usize, cw: bool) {
    for cycle in quarter_turn_cycles(dimen, cw) {
        cycle4(v, *cycle);
    }
}

/// Rotate a row-major slot array a half turn in place
pub fn half_turn<T: Copy>(v: &mut [T], dimen: usize) {
    for &(a, b) in half_turn_pairs(dimen) {
        v.swap(a, b);
    }
}

/// Stable identity of a face grid's content (follows it through rotations)
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct FaceId(pub u32);

/// Smallest fillable unit of a face
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSlot {
    pub filled: bool,
    /// Unique id of the in-flight piece that claimed this slot
    pub reserved_by: Option<u32>,
    pub invisible: bool,
    /// Slot is running its collision shrink/grow
    pub animating: bool,
    /// Render scale (1 = full size)
    pub scale: f32,
    pub color: Color,
}

impl GridSlot {
    fn new(color: Color) -> Self {
        Self {
            filled: false,
            reserved_by: None,
            invisible: false,
            animating: false,
            scale: 1.0,
            color,
        }
    }

    fn counts_filled(&self, include_reserved: bool) -> bool {
        self.filled || (include_reserved && self.reserved_by.is_some())
    }
}

/// One of the cube's six sides
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceGrid {
    pub id: FaceId,
    pub orient: Axis,
    pub dimen: usize,
    /// Identity a piece must match; travels with the content through rotations
    pub map_index: i32,
    pub empty_color: Color,
    pub fill_color: Color,
    pub slots: Vec<GridSlot>,
    pub visible: bool,
    /// Outward offset while fleeing the cube (game lost)
    pub flee: f32,
    #[serde(skip)]
    pub shrink_anim: AnimHandle,
    #[serde(skip)]
    pub grow_anim: AnimHandle,
    #[serde(skip)]
    pub flee_anim: AnimHandle,
}

impl FaceGrid {
    pub fn new(id: FaceId, dimen: usize, map_index: i32, orient: Axis, empty: Color, fill: Color) -> Self {
        debug_assert!(is_valid_dimension(dimen), "grid dimension {dimen} out of range");
        let dimen = dimen.clamp(1, 3);
        Self {
            id,
            orient,
            dimen,
            map_index,
            empty_color: empty,
            fill_color: fill,
            slots: vec![GridSlot::new(empty); dimen * dimen],
            visible: true,
            flee: 0.0,
            shrink_anim: AnimHandle::NONE,
            grow_anim: AnimHandle::NONE,
            flee_anim: AnimHandle::NONE,
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn fill_state(&self, include_reserved: bool) -> FillState {
        let mut any_filled = false;
        let mut any_empty = false;
        for slot in self.slots.iter().filter(|s| !s.invisible) {
            if slot.counts_filled(include_reserved) {
                any_filled = true;
            } else {
                any_empty = true;
            }
        }
        match (any_filled, any_empty) {
            (true, true) => FillState::Partial,
            (_, false) => FillState::Filled,
            (false, true) => FillState::Empty,
        }
    }

    pub fn is_filled(&self, include_reserved: bool) -> bool {
        self.fill_state(include_reserved) == FillState::Filled
    }

    pub fn is_empty(&self, include_reserved: bool) -> bool {
        self.fill_state(include_reserved) == FillState::Empty
    }

    pub fn filled_count(&self) -> usize {
        self.slots.iter().filter(|s| s.filled).count()
    }

    /// Mark the template's slots as claimed by its unique id
    pub fn reserve_slots(&mut self, piece: &PieceTemplate) {
        for (slot, &marked) in self.slots.iter_mut().zip(&piece.fill) {
            if marked {
                slot.reserved_by = Some(piece.unique_id);
            }
        }
    }

    /// Release reservations held by `owner`, or every reservation when `None`
    pub fn clear_reserved(&mut self, owner: Option<u32>) {
        for slot in &mut self.slots {
            if owner.is_none() || slot.reserved_by == owner {
                slot.reserved_by = None;
            }
        }
    }

    /// In-place quarter turn of the slot matrix
    pub fn shuffle_slots(&mut self, cw: bool) {
        quarter_turn(&mut self.slots, self.dimen, cw);
    }

    /// In-place half turn of the slot matrix
    pub fn invert_slots(&mut self) {
        half_turn(&mut self.slots, self.dimen);
    }

    /// Set every slot the piece marks (all slots when `piece` is `None`) to
    /// `is_hit`. Returns whether any slot changed; changed slots are flagged
    /// as animating.
    pub fn apply_fill(&mut self, piece: Option<&PieceTemplate>, is_hit: bool) -> bool {
        let mut changed = false;
        for (i, slot) in self.slots.iter_mut().enumerate() {
            let marked = piece.is_none_or(|p| p.fill.get(i).copied().unwrap_or(false));
            if marked && slot.filled != is_hit {
                slot.filled = is_hit;
                slot.animating = true;
                changed = true;
            }
        }
        changed
    }

    /// Recolor slots from their fill state
    pub fn refresh_colors(&mut self) {
        for slot in &mut self.slots {
            slot.color = if slot.filled { self.fill_color } else { self.empty_color };
        }
    }

    /// Scale the slots changed by the last collision
    pub fn scale_animating(&mut self, scale: f32) {
        for slot in self.slots.iter_mut().filter(|s| s.animating) {
            slot.scale = scale;
        }
    }

    pub fn clear_animating(&mut self) {
        for slot in &mut self.slots {
            slot.animating = false;
            slot.scale = 1.0;
        }
    }

    /// Show or hide every slot of the face
    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        for slot in &mut self.slots {
            slot.invisible = !visible;
        }
    }

    pub fn set_colors(&mut self, empty: Color, fill: Color) {
        self.empty_color = empty;
        self.fill_color = fill;
        self.refresh_colors();
    }
}

/// Immutable snapshot of a face used to build and test a piece
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PieceTemplate {
    /// Reservation owner (0 = holds no reservation)
    pub unique_id: u32,
    pub orient: Axis,
    pub dimen: usize,
    pub map_index: i32,
    pub empty_color: Color,
    pub fill_color: Color,
    pub fill: Vec<bool>,
}

impl PieceTemplate {
    /// Fully filled template with no face identity (hint placeholders)
    pub fn placeholder(orient: Axis, dimen: usize, color: Color) -> Self {
        let dimen = dimen.clamp(1, 3);
        Self {
            unique_id: 0,
            orient,
            dimen,
            map_index: -1,
            empty_color: color,
            fill_color: color,
            fill: vec![true; dimen * dimen],
        }
    }

    /// Snapshot a face's current fill (reserved slots count as filled when asked)
    pub fn from_face(face: &FaceGrid, include_reserved: bool) -> Self {
        Self {
            unique_id: 0,
            orient: face.orient,
            dimen: face.dimen,
            map_index: face.map_index,
            empty_color: face.empty_color,
            fill_color: face.fill_color,
            fill: face.slots.iter().map(|s| s.counts_filled(include_reserved)).collect(),
        }
    }

    pub fn invert(&mut self) {
        for f in &mut self.fill {
            *f = !*f;
        }
    }

    pub fn set_all(&mut self, value: bool) {
        self.fill.iter_mut().for_each(|f| *f = value);
    }

    pub fn copy_fill(&mut self, other: &PieceTemplate) {
        self.fill.clone_from(&other.fill);
    }

    /// Randomly drop marked slots (coin flip each), keeping at most
    /// `max_filled` when it is non-zero. At least one originally marked slot
    /// survives.
    pub fn randomize<R: Rng>(&mut self, rng: &mut R, max_filled: usize) {
        let mut kept = 0;
        let mut fallback = None;
        for (i, f) in self.fill.iter_mut().enumerate() {
            if !*f {
                continue;
            }
            if max_filled > 0 && kept == max_filled {
                *f = false;
                continue;
            }
            *f = rng.random_bool(0.5);
            if *f {
                kept += 1;
            } else if kept == 0 && (fallback.is_none() || rng.random_bool(0.5)) {
                fallback = Some(i);
            }
        }
        if kept == 0 {
            if let Some(i) = fallback {
                self.fill[i] = true;
            }
        }
    }

    /// Mark exactly the slots whose owner entry equals `owner`
    pub fn assign_from(&mut self, owners: &[u8], owner: u8) {
        for (f, &o) in self.fill.iter_mut().zip(owners) {
            *f = o == owner;
        }
    }

    pub fn rotate_cw(&mut self) {
        quarter_turn(&mut self.fill, self.dimen, true);
    }

    /// Mirror the fill list so an overlay facing the cube lines up with a back face
    pub fn mirror_for(&mut self, axis: Axis) {
        for &(a, b) in mirror_pairs(self.dimen, axis) {
            self.fill.swap(a, b);
        }
    }

    pub fn filled_count(&self) -> usize {
        self.fill.iter().filter(|f| **f).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    fn face(dimen: usize) -> FaceGrid {
        FaceGrid::new(FaceId(1), dimen, 0, Axis::Z, BLACK, WHITE)
    }

    #[test]
    fn test_quarter_turn_order_four() {
        for dimen in 1..=3 {
            for cw in [true, false] {
                let orig: Vec<usize> = (0..dimen * dimen).collect();
                let mut v = orig.clone();
                for _ in 0..4 {
                    quarter_turn(&mut v, dimen, cw);
                }
                assert_eq!(v, orig);
                quarter_turn(&mut v, dimen, cw);
                quarter_turn(&mut v, dimen, !cw);
                assert_eq!(v, orig);
            }
        }
    }

    #[test]
    fn test_three_by_three_is_two_cycles() {
        let mut v: Vec<usize> = (0..9).collect();
        quarter_turn(&mut v, 3, true);
        // Center never moves, corners stay corners, edges stay edges
        assert_eq!(v[4], 4);
        for i in [0, 2, 6, 8] {
            assert!([0, 2, 6, 8].contains(&v[i]));
        }
        for i in [1, 3, 5, 7] {
            assert!([1, 3, 5, 7].contains(&v[i]));
        }
        assert_eq!(v, vec![2, 5, 8, 1, 4, 7, 0, 3, 6]);
    }

    #[test]
    fn test_half_turn_matches_two_quarters() {
        for dimen in 2..=3 {
            let mut a: Vec<usize> = (0..dimen * dimen).collect();
            let mut b = a.clone();
            half_turn(&mut a, dimen);
            quarter_turn(&mut b, dimen, true);
            quarter_turn(&mut b, dimen, true);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_dimension_one_never_partial() {
        let mut f = face(1);
        assert_eq!(f.fill_state(false), FillState::Empty);
        f.slots[0].filled = true;
        assert_eq!(f.fill_state(false), FillState::Filled);
    }

    #[test]
    fn test_reserved_counts_only_when_asked() {
        let mut f = face(2);
        let mut t = PieceTemplate::from_face(&f, false);
        t.unique_id = 7;
        t.fill = vec![true, true, false, false];
        f.reserve_slots(&t);
        assert_eq!(f.fill_state(false), FillState::Empty);
        assert_eq!(f.fill_state(true), FillState::Partial);

        f.clear_reserved(Some(3));
        assert_eq!(f.fill_state(true), FillState::Partial);
        f.clear_reserved(Some(7));
        assert_eq!(f.fill_state(true), FillState::Empty);
    }

    #[test]
    fn test_apply_fill_is_idempotent() {
        let mut f = face(3);
        let mut t = PieceTemplate::from_face(&f, false);
        t.invert();
        t.fill[4] = false;
        assert!(f.apply_fill(Some(&t), true));
        assert_eq!(f.filled_count(), 8);
        assert!(!f.apply_fill(Some(&t), true));
        assert_eq!(f.filled_count(), 8);
        assert_eq!(f.fill_state(false), FillState::Partial);
    }

    #[test]
    fn test_apply_fill_without_piece_empties_face() {
        let mut f = face(2);
        f.slots.iter_mut().for_each(|s| s.filled = true);
        assert!(f.apply_fill(None, false));
        assert!(f.is_empty(false));
    }

    #[test]
    fn test_randomize_keeps_at_least_one() {
        let mut rng = Pcg32::seed_from_u64(5);
        for _ in 0..200 {
            let mut t = PieceTemplate::placeholder(Axis::X, 3, WHITE);
            t.fill = vec![false, true, false, true, false, true, false, false, false];
            t.randomize(&mut rng, 2);
            let n = t.filled_count();
            assert!((1..=2).contains(&n));
            // Only originally marked slots can survive
            for i in [0, 2, 4, 6, 7, 8] {
                assert!(!t.fill[i]);
            }
        }
    }

    #[test]
    fn test_assign_partitions_fill() {
        let owners = [1, 2, 3, 2];
        let mut t = PieceTemplate::placeholder(Axis::X, 2, WHITE);
        t.assign_from(&owners, 2);
        assert_eq!(t.fill, vec![false, true, false, true]);
    }

    #[test]
    fn test_mirror_for_axis() {
        let mut t = PieceTemplate::placeholder(Axis::X, 2, WHITE);
        t.fill = vec![true, false, false, false];
        t.mirror_for(Axis::X);
        assert_eq!(t.fill, vec![false, true, false, false]);
        t.mirror_for(Axis::Y);
        assert_eq!(t.fill, vec![false, false, false, true]);
    }

    proptest! {
        #[test]
        fn test_fill_state_classification(
            dimen in 1usize..=3,
            bits in proptest::collection::vec((any::<bool>(), any::<bool>()), 9),
        ) {
            let mut f = face(dimen);
            for (slot, (filled, invisible)) in f.slots.iter_mut().zip(bits.iter()) {
                slot.filled = *filled;
                slot.invisible = *invisible;
            }
            let visible: Vec<&GridSlot> = f.slots.iter().filter(|s| !s.invisible).collect();
            let filled = visible.iter().filter(|s| s.filled).count();
            let expected = if filled == visible.len() {
                FillState::Filled
            } else if filled == 0 {
                FillState::Empty
            } else {
                FillState::Partial
            };
            prop_assert_eq!(f.fill_state(false), expected);
            if dimen == 1 {
                prop_assert_ne!(f.fill_state(false), FillState::Partial);
            }
        }
    }
}
