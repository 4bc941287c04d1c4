//! Identifier helpers shared by the analyzers and the Prisma generator.
//!
//! Singular/plural handling is naive and English-only: add
//! `s`, `es` after a sibilant, `ies` after a consonant + `y`; singular is
//! a trailing `s` trimmed off.

use heck::{ToLowerCamelCase, ToSnakeCase, ToUpperCamelCase};

pub fn pluralize(word: &str) -> String {
    let lower = word.to_ascii_lowercase();
    if ["s", "x", "z", "ch", "sh"].iter().any(|s| lower.ends_with(s)) {
        return format!("{word}es");
    }
    if let Some(stem) = word.strip_suffix('y').or_else(|| word.strip_suffix('Y')) {
        let before = stem.chars().last().map(|c| c.to_ascii_lowercase());
        if before.is_some_and(|c| !"aeiou".contains(c)) {
            return format!("{stem}ies");
        }
    }
    format!("{word}s")
}

pub fn singularize(word: &str) -> String {
    match word.strip_suffix('s').or_else(|| word.strip_suffix('S')) {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => word.to_string(),
    }
}

/// `order_items` -> `OrderItems`
pub fn pascal_case(name: &str) -> String {
    name.to_upper_camel_case()
}

/// `user_id` -> `userId`
pub fn camel_case(name: &str) -> String {
    name.to_lower_camel_case()
}

/// `userName` -> `user_name`
pub fn snake_case(name: &str) -> String {
    name.to_snake_case()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pluralize() {
        assert_eq!(pluralize("user"), "users");
        assert_eq!(pluralize("address"), "addresses");
        assert_eq!(pluralize("box"), "boxes");
        assert_eq!(pluralize("branch"), "branches");
        assert_eq!(pluralize("category"), "categories");
        assert_eq!(pluralize("day"), "days");
    }

    #[test]
    fn test_singularize() {
        assert_eq!(singularize("users"), "user");
        assert_eq!(singularize("user"), "user");
        assert_eq!(singularize("s"), "s");
    }

    #[test]
    fn test_case_conversion() {
        assert_eq!(pascal_case("order_items"), "OrderItems");
        assert_eq!(camel_case("user_id"), "userId");
        assert_eq!(camel_case("id"), "id");
        assert_eq!(snake_case("userName"), "user_name");
    }
}
