//! Tag Model

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Colour used when none is given
pub const DEFAULT_TAG_COLOR: &str = "#3B82F6";

/// Patient tag
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub color: String,
    pub created_at: i64,
}

/// Create tag payload
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TagCreate {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub color: Option<String>,
}

/// Update tag payload
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct TagUpdate {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    pub color: Option<String>,
}

/// `#RRGGBB`
pub fn is_hex_color(value: &str) -> bool {
    value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_color() {
        assert!(is_hex_color(DEFAULT_TAG_COLOR));
        assert!(is_hex_color("#a1b2c3"));
        assert!(!is_hex_color("3B82F6"));
        assert!(!is_hex_color("#3B82F"));
        assert!(!is_hex_color("#GGGGGG"));
    }
}
