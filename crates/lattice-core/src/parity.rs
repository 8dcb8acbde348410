//! Checkerboard parity tag

use std::fmt;

/// Which sites of a topology a container holds
///
/// `Full` covers every site; `Even` and `Odd` are the two half-lattices of a
/// red-black decomposition. The tag is carried through expressions and
/// unified on assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Parity {
    #[default]
    Full,
    Even,
    Odd,
}

impl Parity {
    pub const fn name(self) -> &'static str {
        match self {
            Parity::Full => "full",
            Parity::Even => "even",
            Parity::Odd => "odd",
        }
    }

    /// Even or Odd
    pub const fn is_checkerboarded(self) -> bool {
        !matches!(self, Parity::Full)
    }

    /// The other half-lattice; `Full` is its own opposite
    pub const fn opposite(self) -> Self {
        match self {
            Parity::Full => Parity::Full,
            Parity::Even => Parity::Odd,
            Parity::Odd => Parity::Even,
        }
    }

    /// Parity of a flat site index
    pub const fn of_index(site: usize) -> Self {
        if site % 2 == 0 {
            Parity::Even
        } else {
            Parity::Odd
        }
    }

    /// Whether a site of parity `site` may be accessed through a container
    /// holding `self`
    pub fn admits(self, site: Parity) -> bool {
        self == Parity::Full || site == Parity::Full || self == site
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
