// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod errors;
pub mod handlers;
pub mod http_server;

pub use errors::{ApiError, ApiErrorResponse, ErrorResponse};
pub use handlers::{BannerResponse, HealthResponse, ModelInfo};
pub use http_server::{create_router, start_server, AppState};
