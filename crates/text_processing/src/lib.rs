//! Text normalization for contact resolution
//!
//! This crate is the single home of the phone and name rules used across the
//! workspace:
//! - **Phone**: canonical country-coded digit strings and mobile-9 variants
//! - **Names**: diacritic/phonetic folding and edit-distance similarity
//! - **Slugs**: tag slugs
//!
//! # Example
//!
//! ```ignore
//! use contact_agent_text_processing::{NameNormalizer, PhoneNormalizer};
//!
//! let phones = PhoneNormalizer::default();
//! assert_eq!(phones.normalize("21987654321").as_deref(), Some("5521987654321"));
//!
//! let names = NameNormalizer::default();
//! assert!(names.similarity("Matheus", "Mateus") >= 0.85);
//! ```

pub mod names;
pub mod phone;
pub mod slug;

mod error;

pub use error::{Result, TextProcessingError};
pub use names::{fold, NameNormalizer, SubstitutionRule, Suggestion};
pub use phone::PhoneNormalizer;
pub use slug::slugify;
