use serde::{Deserialize, Serialize};

/// Declares a numeric identifier newtype backed by a database `BIGINT`.
///
/// Wrapping the raw integer prevents mixing up, say, a meal id with a menu
/// id at call sites that take several of them.
macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Creates an identifier from a raw value.
            pub fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the raw value.
            pub fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

numeric_id!(
    /// Identifier of an authenticated user, supplied by the session layer.
    UserId
);

numeric_id!(
    /// Identifier of a catalog meal.
    MealId
);

numeric_id!(
    /// Identifier of a weekly menu.
    MenuId
);

numeric_id!(
    /// Identifier of a user's cart.
    CartId
);

numeric_id!(
    /// Identifier of a single cart line.
    CartItemId
);

numeric_id!(
    /// Identifier of a completed order.
    OrderId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_from_raw_preserves_value() {
        let id = MealId::new(42);
        assert_eq!(id.as_i64(), 42);
        assert_eq!(i64::from(id), 42);
        assert_eq!(MealId::from(42), id);
    }

    #[test]
    fn id_displays_raw_value() {
        assert_eq!(OrderId::new(7).to_string(), "7");
    }

    #[test]
    fn id_serializes_transparently() {
        let json = serde_json::to_string(&UserId::new(3)).unwrap();
        assert_eq!(json, "3");
        let back: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, UserId::new(3));
    }
}
