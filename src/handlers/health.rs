/// `GET /healthz` — process liveness only, no pipeline semantics.
pub async fn healthz() -> &'static str {
    "ok"
}
