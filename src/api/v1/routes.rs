/*
 * Responsibility
 * - v1 の URL 構造を定義
 * - bearer token が必要な範囲 (現在は /me のみ) に auth middleware を適用
 */
use axum::{Router, routing::get};

use crate::api::v1::handlers::me::me;
use crate::middleware::auth::bearer;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    let protected = Router::new().route("/me", get(me));

    bearer::apply(protected, state)
}
