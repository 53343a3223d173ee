//! Identifier case conversion for resolved column names

/// Split an identifier or expression into lower-case words
///
/// Breaks on any non-alphanumeric character and on lower-to-upper case
/// transitions (`createdAt` -> `created`, `at`).
fn words(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut previous_lower = false;

    for ch in text.chars() {
        if !ch.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            previous_lower = false;
            continue;
        }

        if ch.is_uppercase() && previous_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }

        previous_lower = ch.is_lowercase() || ch.is_ascii_digit();
        current.extend(ch.to_lowercase());
    }

    if !current.is_empty() {
        words.push(current);
    }

    words
}

/// `users.createdAt` -> `users_created_at`
pub fn snake_case(text: &str) -> String {
    words(text).join("_")
}

/// `users.created_at` -> `UsersCreatedAt`
pub fn upper_camel_case(text: &str) -> String {
    words(text)
        .iter()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snake_case_conversion() {
        assert_eq!(snake_case("users.id"), "users_id");
        assert_eq!(snake_case("count(id)"), "count_id");
        assert_eq!(snake_case("createdAt"), "created_at");
        assert_eq!(snake_case("  COUNT( * ) "), "count");
        assert_eq!(snake_case("*"), "");
    }

    #[test]
    fn upper_camel_conversion() {
        assert_eq!(upper_camel_case("users.id"), "UsersId");
        assert_eq!(upper_camel_case("order_items.created_at"), "OrderItemsCreatedAt");
        assert_eq!(upper_camel_case("total"), "Total");
        assert_eq!(upper_camel_case("sum(amount)"), "SumAmount");
    }
}
