use uuid::Uuid;

/// Produces identity tokens for rules, conditions and fractional entries.
///
/// Tokens only identify list items for the editors; they never reach the
/// wire format.
pub trait IdSource {
    fn next_id(&self) -> String;
}

/// [IdSource] handing out random v4 UUIDs
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidSource;

impl IdSource for UuidSource {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}
