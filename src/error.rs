/* This file is part of csmt
 *
 * Copyright (C) 2024-2026 Dyne.org foundation
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use sled_overlay::sled;

/// Crate result type
pub type Result<T> = std::result::Result<T, Error>;

/// Crate error type
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("Key not found in tree")]
    KeyNotFound,

    #[error("Branch proof failed verification")]
    BadProof,

    #[error("Storage inconsistency: {0}")]
    StorageInconsistent(String),

    #[error("Storage commit failed: {0}")]
    StorageCommitFailed(String),

    #[error("Parse failed: {0}")]
    ParseFailed(&'static str),

    #[error("sled error: {0}")]
    SledError(String),
}

impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        Self::SledError(err.to_string())
    }
}
