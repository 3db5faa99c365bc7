//! Handshake patterns as fixed token tables.
//!
//! Fundamental patterns key:
//! # First character
//! N: **N**o static key for initiator
//! K: Static key for initiator **K**nown to responder
//! X: Static key for initiator **X**mitted to responder
//! I: Static key for initiator **I**mmediately transmitted to responder, despite reduced or absent ID
//! hiding
//!
//! # Second character
//! N: **N**o static key for responder
//! K: Static key for responder **K**nown to initiator
//! X: Static key for responder **X**mitted to initiator
//!
//! A lone letter names a one-way pattern, where only the initiator ever sends.
use std::{fmt, str::FromStr};

use crate::error::CryptoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    E,
    S,
    EE,
    ES,
    SE,
    SS,
    Psk,
}

use Token::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pattern {
    N,
    K,
    X,
    NN,
    NK,
    NX,
    KN,
    KK,
    KX,
    XN,
    XK,
    XX,
    IN,
    IK,
    IX,
}

const ALL: [Pattern; 15] = [
    Pattern::N,
    Pattern::K,
    Pattern::X,
    Pattern::NN,
    Pattern::NK,
    Pattern::NX,
    Pattern::KN,
    Pattern::KK,
    Pattern::KX,
    Pattern::XN,
    Pattern::XK,
    Pattern::XX,
    Pattern::IN,
    Pattern::IK,
    Pattern::IX,
];

impl Pattern {
    pub const fn name(self) -> &'static str {
        match self {
            Pattern::N => "N",
            Pattern::K => "K",
            Pattern::X => "X",
            Pattern::NN => "NN",
            Pattern::NK => "NK",
            Pattern::NX => "NX",
            Pattern::KN => "KN",
            Pattern::KK => "KK",
            Pattern::KX => "KX",
            Pattern::XN => "XN",
            Pattern::XK => "XK",
            Pattern::XX => "XX",
            Pattern::IN => "IN",
            Pattern::IK => "IK",
            Pattern::IX => "IX",
        }
    }

    pub const fn is_one_way(self) -> bool {
        matches!(self, Pattern::N | Pattern::K | Pattern::X)
    }

    /// Keys the responder knows of the initiator before the first message.
    pub const fn initiator_pre(self) -> &'static [Token] {
        match self {
            Pattern::K | Pattern::KN | Pattern::KK | Pattern::KX => &[S],
            _ => &[],
        }
    }

    /// Keys the initiator knows of the responder before the first message.
    pub const fn responder_pre(self) -> &'static [Token] {
        match self {
            Pattern::N | Pattern::K | Pattern::X | Pattern::NK | Pattern::KK | Pattern::XK | Pattern::IK => {
                &[S]
            }
            _ => &[],
        }
    }

    /// Message token lists. Even indices are sent by the initiator.
    pub const fn messages(self) -> &'static [&'static [Token]] {
        match self {
            Pattern::N => &[&[E, ES]],
            Pattern::K => &[&[E, ES, SS]],
            Pattern::X => &[&[E, ES, S, SS]],
            Pattern::NN => &[&[E], &[E, EE]],
            Pattern::NK => &[&[E, ES], &[E, EE]],
            Pattern::NX => &[&[E], &[E, EE, S, ES]],
            Pattern::KN => &[&[E], &[E, EE, SE]],
            Pattern::KK => &[&[E, ES, SS], &[E, EE, SE]],
            Pattern::KX => &[&[E], &[E, EE, SE, S, ES]],
            Pattern::XN => &[&[E], &[E, EE], &[S, SE]],
            Pattern::XK => &[&[E, ES], &[E, EE], &[S, SE]],
            Pattern::XX => &[&[E], &[E, EE, S, ES], &[S, SE]],
            Pattern::IN => &[&[E, S], &[E, EE, SE]],
            Pattern::IK => &[&[E, ES, S, SS], &[E, EE, SE]],
            Pattern::IX => &[&[E, S], &[E, EE, SE, S, ES]],
        }
    }
}

/// A base pattern plus an optional `pskN` modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandshakePattern {
    pub base: Pattern,
    pub psk: Option<usize>,
}

impl HandshakePattern {
    pub const fn new(base: Pattern) -> Self {
        Self { base, psk: None }
    }

    pub fn message_count(&self) -> usize {
        self.base.messages().len()
    }

    /// Tokens of message `index`. `psk0` leads the first message, `pskN` trails message N.
    pub fn message(&self, index: usize) -> impl Iterator<Item = Token> {
        let lead = (self.psk == Some(0) && index == 0).then_some(Psk);
        let tail = (self.psk == Some(index + 1)).then_some(Psk);
        lead.into_iter()
            .chain(self.base.messages()[index].iter().copied())
            .chain(tail)
    }
}

impl From<Pattern> for HandshakePattern {
    fn from(base: Pattern) -> Self {
        Self::new(base)
    }
}

impl FromStr for HandshakePattern {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unsupported = || CryptoError::UnsupportedAlgorithm(s.to_owned());
        let (base, psk) = match s.split_once("psk") {
            Some((base, n)) => (base, Some(n.parse::<usize>().map_err(|_| unsupported())?)),
            None => (s, None),
        };
        let base = ALL
            .into_iter()
            .find(|p| p.name() == base)
            .ok_or_else(unsupported)?;
        if psk.is_some_and(|n| n > base.messages().len()) {
            return Err(unsupported());
        }
        Ok(Self { base, psk })
    }
}

impl fmt::Display for HandshakePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.base.name())?;
        if let Some(n) = self.psk {
            write!(f, "psk{n}")?;
        }
        Ok(())
    }
}
