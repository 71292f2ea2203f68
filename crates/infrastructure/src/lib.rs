//! Infrastructure layer: concrete implementations of the nine pipeline
//! components (C1–C9) the application layer's ports describe. No public
//! API beyond `dns::*` — collaborators (profile DB, GeoIP, upstream,
//! transport) are wired in by the binary crate.

pub mod dns;
