/*
 * Responsibility
 * - middleware の公開インターフェース
 * - http: 横断的な HTTP layer, auth: bearer token filter
 */
pub mod auth;
pub mod http;
