//! Database seeding functionality
//!
//! This module provides functionality to seed the database with initial
//! data. It includes the default field mapping rules a fresh deployment
//! needs before the mapper can do anything useful.

pub mod field_mappings;

pub use field_mappings::seed_field_mappings;
