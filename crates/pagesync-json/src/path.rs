//! Path syntax helpers.
//!
//! Paths are dot-separated keys. Array indices appear either bracketed
//! (`items[2].name`) or as a bare numeral (`items.2.name`); both forms parse
//! identically after [`normalize_path`].

/// Rewrite bracketed indices as dot segments: `a[2].b` becomes `a.2.b`.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for ch in path.chars() {
        match ch {
            '[' => out.push('.'),
            ']' => {}
            c => out.push(c),
        }
    }
    match out.strip_prefix('.') {
        Some(rest) => rest.to_owned(),
        None => out,
    }
}

/// Segments of a normalized path. The empty path has no segments.
pub fn segments(normalized: &str) -> impl Iterator<Item = &str> {
    normalized.split('.').filter(|s| !s.is_empty())
}

/// Where an "add" delta inserts its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertTarget<'a> {
    /// Path ends in an index marker: append to the array at `array_path`.
    ArrayAppend { array_path: &'a str },
    /// Set `key` on the object at `parent_path`.
    Property { parent_path: &'a str, key: &'a str },
    /// Set `key` on the document root.
    RootProperty { key: &'a str },
}

/// Classify an insertion path.
#[must_use]
pub fn insert_target(path: &str) -> InsertTarget<'_> {
    if path.ends_with(']') {
        if let Some(open) = path.rfind('[') {
            return InsertTarget::ArrayAppend {
                array_path: &path[..open],
            };
        }
    }
    match path.rfind('.') {
        Some(dot) => InsertTarget::Property {
            parent_path: &path[..dot],
            key: &path[dot + 1..],
        },
        None => InsertTarget::RootProperty { key: path },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bracket_and_dot_forms_match() {
        assert_eq!(normalize_path("items[2].name"), "items.2.name");
        assert_eq!(normalize_path("items.2.name"), "items.2.name");
        assert_eq!(normalize_path("grid[1][3]"), "grid.1.3");
    }

    #[test]
    fn leading_index_has_no_empty_segment() {
        assert_eq!(normalize_path("[0].x"), "0.x");
    }

    #[test]
    fn empty_path_has_no_segments() {
        assert_eq!(segments("").count(), 0);
        assert_eq!(segments("a.b").collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn insert_targets() {
        assert_eq!(
            insert_target("items[3]"),
            InsertTarget::ArrayAppend {
                array_path: "items"
            }
        );
        assert_eq!(
            insert_target("a.b[0].c"),
            InsertTarget::Property {
                parent_path: "a.b[0]",
                key: "c"
            }
        );
        assert_eq!(
            insert_target("title"),
            InsertTarget::RootProperty { key: "title" }
        );
    }
}
