//! Integration tests: the core components wired to in-memory
//! collaborators, no network or database required.

mod analysis;
mod graph;
mod mocks;
