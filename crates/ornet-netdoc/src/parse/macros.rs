//! Declares the `decl_keyword!` macro used by each document type.

/// Declare an enumeration that implements
/// [`Keyword`](crate::parse::keyword::Keyword).
///
/// Each variant is declared with the string (or strings) that map to
/// it; annotation keywords are simply declared with their `@`-prefixed
/// string.  Two extra variants, `UNRECOGNIZED` and `ANN_UNRECOGNIZED`,
/// are appended automatically to absorb keywords this parser doesn't
/// know.
///
/// # Example
///
/// ```ignore
/// decl_keyword! {
///     FruitKwd {
///         "@tasty" => ANN_TASTY,
///         "apple" => APPLE,
///         "cherry" | "plum" => STONEFRUIT,
///     }
/// }
/// ```
macro_rules! decl_keyword {
    { $(#[$meta:meta])* $v:vis $name:ident {
        $( $($s:literal)|+ => $i:ident ),* $(,)?
    } } => {
        #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
        #[allow(non_camel_case_types)]
        #[allow(missing_docs)]
        #[allow(clippy::missing_docs_in_private_items)]
        $(#[$meta])*
        $v enum $name {
            $( $i , )*
            /// Any keyword we don't recognize.
            UNRECOGNIZED,
            /// Any annotation we don't recognize.
            ANN_UNRECOGNIZED,
        }
        impl $crate::parse::keyword::Keyword for $name {
            fn idx(self) -> usize {
                self as usize
            }
            fn n_vals() -> usize {
                ($name::ANN_UNRECOGNIZED as usize) + 1
            }
            fn from_idx(i: usize) -> Option<Self> {
                /// All values of this keyword, in index order.
                const ALL: &[$name] = &[
                    $( $name::$i , )*
                    $name::UNRECOGNIZED,
                    $name::ANN_UNRECOGNIZED,
                ];
                ALL.get(i).copied()
            }
            fn from_str(s: &str) -> Self {
                match s {
                    $( $($s)|+ => $name::$i , )*
                    other => {
                        if other.starts_with('@') {
                            $name::ANN_UNRECOGNIZED
                        } else {
                            $name::UNRECOGNIZED
                        }
                    }
                }
            }
            fn to_str(self) -> &'static str {
                match self {
                    $( $name::$i => decl_keyword!(@first $($s),+) , )*
                    $name::UNRECOGNIZED => "<unrecognized>",
                    $name::ANN_UNRECOGNIZED => "<unrecognized annotation>",
                }
            }
            fn is_annotation(self) -> bool {
                match self {
                    $( $name::$i => decl_keyword!(@first $($s),+).starts_with('@') , )*
                    $name::UNRECOGNIZED => false,
                    $name::ANN_UNRECOGNIZED => true,
                }
            }
            fn unrecognized() -> Self {
                $name::UNRECOGNIZED
            }
            fn ann_unrecognized() -> Self {
                $name::ANN_UNRECOGNIZED
            }
        }
    };
    { @first $first:literal $(, $rest:literal)* } => { $first };
}

#[cfg(test)]
pub(crate) mod test {
    #![allow(clippy::unwrap_used)]

    decl_keyword! {
        pub(crate) Fruit {
            "@tasty" => ANN_TASTY,
            "apple" => APPLE,
            "orange" => ORANGE,
            "lemon" => LEMON,
            "guava" => GUAVA,
            "cherry" | "plum" => STONEFRUIT,
            "banana" => BANANA,
        }
    }

    #[test]
    fn kwd() {
        use crate::parse::keyword::Keyword;
        use Fruit::*;
        assert_eq!(Fruit::from_str("lemon"), LEMON);
        assert_eq!(Fruit::from_str("cherry"), STONEFRUIT);
        assert_eq!(Fruit::from_str("plum"), STONEFRUIT);
        assert_eq!(Fruit::from_str("mango"), UNRECOGNIZED);
        assert_eq!(Fruit::from_str("@tasty"), ANN_TASTY);
        assert_eq!(Fruit::from_str("@tastier"), ANN_UNRECOGNIZED);

        assert_eq!(APPLE.idx(), 1);
        assert_eq!(ORANGE.idx(), 2);
        assert_eq!(ANN_UNRECOGNIZED.idx(), Fruit::n_vals() - 1);
        assert_eq!(Fruit::from_idx(1), Some(APPLE));
        assert_eq!(Fruit::from_idx(Fruit::n_vals()), None);

        assert_eq!(STONEFRUIT.to_str(), "cherry");
        assert!(ANN_TASTY.is_annotation());
        assert!(ANN_UNRECOGNIZED.is_annotation());
        assert!(!APPLE.is_annotation());
        assert!(!UNRECOGNIZED.is_annotation());
    }
}
