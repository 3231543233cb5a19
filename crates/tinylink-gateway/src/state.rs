use std::sync::Arc;

use tinylink_core::Shortener;

use crate::cookie::CookieSigner;

#[derive(Clone)]
pub struct AppState {
    shortener: Arc<dyn Shortener>,
    cookies: CookieSigner,
}

impl AppState {
    pub fn new(shortener: Arc<dyn Shortener>, cookies: CookieSigner) -> Self {
        Self { shortener, cookies }
    }

    pub fn shortener(&self) -> &dyn Shortener {
        self.shortener.as_ref()
    }

    pub fn cookies(&self) -> &CookieSigner {
        &self.cookies
    }
}
