//! Group a contact spreadsheet by city, render one PDF per city and hand the
//! set out as a ZIP, behind a small session-aware web front end.

pub mod archive;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod group;
pub mod pipeline;
pub mod render;
pub mod server;
pub mod session;
pub mod sheet;
pub mod workspace;
