use uuid::Uuid;

/// Venue limit on client order id length
pub const MAX_CLIENT_ORDER_ID_LEN: usize = 32;

/// Generate a client order id tagged with the owning strategy.
///
/// Format is `s{strategy_id}x{hex}`, alphanumeric only and at most 32 chars,
/// so the strategy can be recovered from any snapshot that echoes the id.
pub fn generate(strategy_id: u32) -> String {
    let mut id = format!("s{}x{}", strategy_id, Uuid::new_v4().simple());
    id.truncate(MAX_CLIENT_ORDER_ID_LEN);
    id
}

/// Recover the strategy tag from a client order id produced by [`generate`]
pub fn parse_strategy_id(client_order_id: &str) -> Option<u32> {
    let rest = client_order_id.strip_prefix('s')?;
    let (tag, _) = rest.split_once('x')?;
    tag.parse().ok()
}
