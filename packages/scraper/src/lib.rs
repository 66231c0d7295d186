#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Fetching and walking paginated listing pages.
//!
//! The pieces compose bottom-up:
//!
//! * [`transport`]: the HTTP seam ([`transport::Transport`]) and its
//!   `reqwest` implementation.
//! * [`identity`], [`retry`], [`throttle`]: the individual request rules.
//! * [`fetch`]: [`fetch::FetchPolicy`], which applies all of the above to
//!   every request.
//! * [`extract`]: per-site [`extract::PageExtractor`]s that read records and
//!   next links out of a page body.
//! * [`canonical`]: normalization of outbound URLs found on pages.
//! * [`pagination`]: [`pagination::PaginationWalker`], which follows one
//!   row's chain of pages from its seed URL.
//!
//! This crate knows nothing about input files, output files or progress;
//! those live in `listcrawl_crawl`.

pub mod canonical;
pub mod extract;
pub mod fetch;
pub mod identity;
pub mod pagination;
pub mod retry;
pub mod throttle;
pub mod transport;
