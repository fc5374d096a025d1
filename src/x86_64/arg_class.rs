//! x86_64 System V argument classes.

/// Eightbyte classification class, per AMD64 ABI §3.2.3.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArgClass {
    /// No class yet; merges to the other operand.
    NoClass,
    /// General-purpose register.
    Integer,
    /// SSE register.
    Sse,
    /// Upper half of an SSE register pair; only valid above `Sse`.
    SseUp,
    /// x87 stack, low half.
    X87,
    /// x87 stack, high half.
    X87Up,
    /// `_Complex long double`.
    ComplexX87,
    /// Passed in memory.
    Memory,
}

impl ArgClass {
    /// Merge two field classes within one eightbyte, per AMD64 ABI
    /// §3.2.3p2 rule 4:
    ///
    /// (a) equal classes merge to themselves; (b) `NoClass` merges to the
    /// other class; (c) `Memory` wins; (d) `Integer` wins over what is
    /// left; (e) any x87-family class mixed with anything else goes to
    /// memory; (f) otherwise the result is `Sse`.
    pub fn merge(self, other: ArgClass) -> ArgClass {
        use ArgClass::*;

        if self == other {
            return self;
        }
        if self == NoClass {
            return other;
        }
        if other == NoClass {
            return self;
        }
        if self == Memory || other == Memory {
            return Memory;
        }
        if self == Integer || other == Integer {
            return Integer;
        }
        if matches!(self, X87 | X87Up | ComplexX87) || matches!(other, X87 | X87Up | ComplexX87) {
            return Memory;
        }
        Sse
    }
}
