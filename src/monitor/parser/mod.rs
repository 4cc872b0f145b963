// SPDX-License-Identifier: Apache-2.0

//! Log line parsing.
//!
//! Each supported game has an [`EventParser`] that turns raw lines into
//! [`Event`](crate::monitor::Event)s. Parsers are looked up by log format in a
//! [`ParserRegistry`].
//!
//! # Available Parsers
//!
//! - [`TheIsleParser`] - The Isle: Evrima (`the_isle_evrima`)
//! - [`PathOfTitansParser`] - Path of Titans (`path_of_titans`)

pub mod evrima;
pub mod fields;
pub mod path_of_titans;
mod registry;
mod traits;

pub use evrima::{THE_ISLE_EVRIMA, TheIsleParser};
pub use path_of_titans::{PATH_OF_TITANS, PathOfTitansParser};
pub use registry::ParserRegistry;
pub use traits::EventParser;
