// SPDX-License-Identifier: GPL-3.0-or-later

use async_trait::async_trait;
use prism_domain::{Isrc, PartialRecord, SourceKind, SourceName, SourceOutcome, TrackSeed};

use crate::error::{Result, SourceError};

/// A metadata vendor that can be asked about one recording.
///
/// Implementations never fail: transport and decoding problems are folded
/// into [`SourceOutcome::Error`] so one vendor cannot abort a collection.
#[async_trait]
pub trait SourceClient: Send + Sync {
    fn name(&self) -> SourceName;

    fn kind(&self) -> SourceKind {
        self.name().kind()
    }

    /// Look up `isrc`. Secondary sources need `seed` and report
    /// [`SourceOutcome::NotFound`] without one.
    async fn lookup(&self, isrc: &Isrc, seed: Option<&TrackSeed>) -> SourceOutcome;
}

/// Fold a client result into an outcome.
pub fn outcome_from(result: Result<Option<PartialRecord>>) -> SourceOutcome {
    match result {
        Ok(Some(partial)) => SourceOutcome::Found(partial),
        Ok(None) => SourceOutcome::NotFound,
        Err(SourceError::NotFound(_)) => SourceOutcome::NotFound,
        Err(error) => SourceOutcome::Error(error.to_string()),
    }
}

/// Trimmed, non-empty copy of an optional string.
pub(crate) fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
