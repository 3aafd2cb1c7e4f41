//! Static argument shape of a call site.

use std::fmt;

/// Argument count a site passes. Low counts are passed without a collection
/// on the direct path; `Many` covers everything else, including splats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Arity {
    Zero,
    One,
    Two,
    Three,
    Many,
}

impl Arity {
    pub fn of(count: usize) -> Self {
        match count {
            0 => Arity::Zero,
            1 => Arity::One,
            2 => Arity::Two,
            3 => Arity::Three,
            _ => Arity::Many,
        }
    }

    /// `None` for `Many`.
    pub fn fixed(self) -> Option<usize> {
        match self {
            Arity::Zero => Some(0),
            Arity::One => Some(1),
            Arity::Two => Some(2),
            Arity::Three => Some(3),
            Arity::Many => None,
        }
    }

    #[inline]
    pub fn accepts(self, count: usize) -> bool {
        self.fixed().is_none_or(|n| n == count)
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.fixed() {
            Some(n) => write!(f, "{n}"),
            None => f.write_str("n"),
        }
    }
}

/// How the call was written, which decides what visibility it may reach.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum CallType {
    /// `recv.name(...)`: public methods, protected ones from a kindred caller.
    #[default]
    Normal,
    /// `name(...)` with implicit self: any visibility.
    Functional,
    /// A bare identifier that may have been a local variable.
    Variable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallShape {
    pub arity: Arity,
    pub has_block: bool,
    pub call_type: CallType,
}

impl CallShape {
    pub fn new(arity: Arity, call_type: CallType) -> Self {
        Self {
            arity,
            has_block: false,
            call_type,
        }
    }

    pub fn with_block(mut self) -> Self {
        self.has_block = true;
        self
    }
}

impl Default for CallShape {
    fn default() -> Self {
        Self::new(Arity::Zero, CallType::Normal)
    }
}

impl fmt::Display for CallShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{}", self.call_type, self.arity)?;
        if self.has_block {
            f.write_str("&")?;
        }
        Ok(())
    }
}
