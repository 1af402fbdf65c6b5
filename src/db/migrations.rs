//! Embedded SQL migrations, run automatically at startup (spec §2a/§9a).
//! This is ambient schema plumbing, not a general-purpose schema migration
//! product.

refinery::embed_migrations!("migrations");
