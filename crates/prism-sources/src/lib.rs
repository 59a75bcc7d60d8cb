// SPDX-License-Identifier: GPL-3.0-or-later

//! Rate-limited clients for the metadata vendors PRISM aggregates.
//!
//! Every client implements [`SourceClient`]: it is asked about one ISRC and
//! answers with a [`prism_domain::SourceOutcome`]. MusicBrainz and Spotify
//! can be searched by ISRC directly; the other vendors need a title and
//! artist seed taken from one of them.

pub mod client;
pub mod discogs;
pub mod error;
pub mod genius;
pub mod http;
pub mod lastfm;
pub mod musicbrainz;
pub mod rate_limiter;
pub mod spotify;
pub mod youtube;

pub use client::{outcome_from, SourceClient};
pub use discogs::DiscogsClient;
pub use error::{Result, SourceError};
pub use genius::GeniusClient;
pub use http::{ClientOptions, SourceHttp, USER_AGENT};
pub use lastfm::LastFmClient;
pub use musicbrainz::MusicBrainzClient;
pub use rate_limiter::SlidingWindowRateLimiter;
pub use spotify::{SpotifyClient, SpotifyCredentials};
pub use youtube::YouTubeClient;
