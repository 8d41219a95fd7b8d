//! Library entities, request shapes and list filters.

pub(crate) mod book;
mod borrow;
mod query;
pub(crate) mod reader;
mod reservation;

pub use book::*;
pub use borrow::*;
pub use query::*;
pub use reader::*;
pub use reservation::*;

/// Generates a record id: one-letter prefix plus 8 upper-case hex digits (e.g. `B1A2B3C4D`).
pub fn generate_id(prefix: char) -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("{}{}", prefix, hex[..8].to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_have_prefix_and_hex_suffix() {
        let id = generate_id('B');
        assert_eq!(id.len(), 9);
        assert!(id.starts_with('B'));
        assert!(id[1..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        assert_ne!(generate_id('B'), generate_id('B'));
    }
}
