// API Middleware
//
// This module contains request-adjacent helpers for the API layer: client
// IP extraction for connection/rate limiting.

pub mod client_ip;

pub use client_ip::extract_client_ip;
