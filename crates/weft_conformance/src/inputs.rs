//! Builders for the syntax fragments the fixture generators consume.
//!
//! A host would extract these from real source files. Fields carry
//! `namespace`, `class`, `name` and `type` properties plus an optional
//! `PropertyName` attribute argument; methods carry `namespace`, `class` and
//! `name`.

use weft_engine::{FragmentKind, SyntaxFragment};

/// Marker attribute selecting fields for the AutoNotify generator.
pub const AUTO_NOTIFY_ATTRIBUTE: &str = "AutoNotify.AutoNotifyAttribute";

/// Marker attribute selecting partial methods to implement.
pub const GENERATED_ATTRIBUTE: &str = "GeneratedNamespace.GeneratedAttribute";

/// An `[AutoNotify]` field declaration.
pub fn auto_notify_field(namespace: &str, class: &str, name: &str, ty: &str) -> SyntaxFragment {
    SyntaxFragment::new(
        format!("{namespace}.{class}.{name}"),
        FragmentKind::Field,
        AUTO_NOTIFY_ATTRIBUTE,
    )
    .with_property("namespace", namespace)
    .with_property("class", class)
    .with_property("name", name)
    .with_property("type", ty)
}

/// An `[AutoNotify(PropertyName = ...)]` field declaration.
pub fn renamed_field(
    namespace: &str,
    class: &str,
    name: &str,
    ty: &str,
    property: &str,
) -> SyntaxFragment {
    auto_notify_field(namespace, class, name, ty).with_property("PropertyName", property)
}

/// A `[Generated]` partial method declaration.
pub fn generated_method(namespace: &str, class: &str, name: &str) -> SyntaxFragment {
    SyntaxFragment::new(
        format!("{namespace}.{class}.{name}()"),
        FragmentKind::Method,
        GENERATED_ATTRIBUTE,
    )
    .with_property("namespace", namespace)
    .with_property("class", class)
    .with_property("name", name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_engine::Tagged;

    #[test]
    fn field_identity_is_qualified() {
        let field = auto_notify_field("App", "User", "_count", "int");
        assert_eq!(field.id, "App.User._count");
        assert_eq!(field.tag(), "field");
        assert_eq!(field.property("type"), Some("int"));
        assert_eq!(field.property("PropertyName"), None);
    }

    #[test]
    fn methods_and_fields_do_not_collide() {
        let method = generated_method("App", "User", "Run");
        assert_ne!(method.identity(), auto_notify_field("App", "User", "Run", "int").identity());
        assert_eq!(method.marker, GENERATED_ATTRIBUTE);
    }
}
