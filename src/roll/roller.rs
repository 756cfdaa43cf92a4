use crate::common::UInt;
use rand::Rng;

/// A source of raw die faces in `1..=sides`.
pub trait Roller {
    fn roll(&mut self, sides: UInt) -> UInt;
}

impl<R: Rng> Roller for R {
    fn roll(&mut self, sides: UInt) -> UInt {
        self.gen_range(1..=sides.max(1))
    }
}

/// Yields `initial, initial + step, ...` wrapped into the face range.
///
/// Handy wherever a predictable sequence of rolls is wanted, e.g. in tests or
/// when replaying a roll.
#[derive(Debug, Clone)]
pub struct StepRoller {
    current: UInt,
    step: UInt,
}

impl StepRoller {
    pub fn new(initial: UInt, step: UInt) -> Self {
        Self {
            current: initial.max(1),
            step,
        }
    }
}

impl Roller for StepRoller {
    fn roll(&mut self, sides: UInt) -> UInt {
        let sides = sides.max(1);
        let ret = (self.current - 1) % sides + 1;
        self.current += self.step;
        ret
    }
}

/// Replays a fixed list of faces, cycling once exhausted.
#[derive(Debug, Clone)]
pub struct SequenceRoller {
    faces: Vec<UInt>,
    next: usize,
}

impl SequenceRoller {
    pub fn new(faces: impl Into<Vec<UInt>>) -> Self {
        Self {
            faces: faces.into(),
            next: 0,
        }
    }
}

impl Roller for SequenceRoller {
    fn roll(&mut self, sides: UInt) -> UInt {
        if self.faces.is_empty() {
            return 1;
        }
        let face = self.faces[self.next % self.faces.len()];
        self.next += 1;
        face.clamp(1, sides.max(1))
    }
}
