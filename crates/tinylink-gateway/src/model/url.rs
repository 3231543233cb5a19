use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct ShortenRequest {
    pub url: String,
}

#[derive(Serialize)]
pub struct ShortenResponse {
    pub result: String,
}

#[derive(Deserialize)]
pub struct BatchRequestItem {
    pub correlation_id: String,
    pub original_url: String,
}

#[derive(Serialize)]
pub struct BatchResponseItem {
    pub correlation_id: String,
    pub short_url: String,
}

#[derive(Serialize)]
pub struct UserUrl {
    pub short_url: String,
    pub original_url: String,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub urls: u64,
    pub users: u64,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}
