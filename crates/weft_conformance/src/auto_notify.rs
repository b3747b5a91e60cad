//! The AutoNotify property generator.
//!
//! Every `[AutoNotify]` field becomes a property raising `PropertyChanged`.
//! Fields are grouped by `(namespace, class)` and each class gets one
//! `{class}_AutoNotify.g.cs` artifact, so editing one class leaves every
//! other class's artifact untouched.

use weft_diagnostics::Diagnostic;
use weft_engine::{PipelineBuilder, SyntaxFragment, TransformError};

use crate::inputs::AUTO_NOTIFY_ATTRIBUTE;

/// Diagnostic id used by every fixture generator.
pub const GENERATOR_INFO: &str = "GEN001";

/// One field turned into a property.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldModel {
    /// Namespace of the containing class; empty for the global namespace.
    pub namespace: String,
    /// Containing class.
    pub class: String,
    /// Declared field name, e.g. `_count`.
    pub field: String,
    /// Declared field type.
    pub ty: String,
    /// Name of the generated property, e.g. `Count`.
    pub property: String,
}

/// The `(namespace, class)` key fields are grouped by.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClassKey {
    /// Namespace of the class.
    pub namespace: String,
    /// Class name.
    pub class: String,
}

/// Derives a property name from a field name: strip one leading `_`, then
/// upper-case the first letter.
pub fn property_name(field: &str) -> Option<String> {
    let trimmed = field.strip_prefix('_').unwrap_or(field);
    let mut chars = trimmed.chars();
    let first = chars.next()?;
    Some(first.to_uppercase().chain(chars).collect())
}

fn required<'a>(fragment: &'a SyntaxFragment, key: &str) -> Result<&'a str, TransformError> {
    match fragment.property(key) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => {
            let err = TransformError::new(format!("field `{}` has no `{key}`", fragment.id));
            Err(match &fragment.location {
                Some(location) => err.at(location.clone()),
                None => err,
            })
        }
    }
}

/// Builds the property model for one field fragment.
pub fn to_property_model(fragment: &SyntaxFragment) -> Result<FieldModel, TransformError> {
    let field = required(fragment, "name")?;
    let property = match fragment.property("PropertyName") {
        Some(explicit) if !explicit.is_empty() => explicit.to_string(),
        _ => property_name(field).ok_or_else(|| {
            TransformError::new(format!("cannot derive a property name from `{field}`"))
        })?,
    };
    Ok(FieldModel {
        namespace: fragment.property("namespace").unwrap_or_default().to_string(),
        class: required(fragment, "class")?.to_string(),
        field: field.to_string(),
        ty: required(fragment, "type")?.to_string(),
        property,
    })
}

fn render_property(field: &FieldModel) -> String {
    format!(
        r#"        // fieldName= {field}
        // fieldType {ty}
        // PropertyName= {property}
        public {ty} {property}
        {{
            get => {field};
            set
            {{
                {field} = value;
                PropertyChanged?.Invoke(this, new PropertyChangedEventArgs("{property}"));
            }}
        }}"#,
        field = field.field,
        ty = field.ty,
        property = field.property,
    )
}

/// Renders the partial class for one group of fields, properties sorted by
/// backing field name.
pub fn render_class(key: &ClassKey, fields: &[FieldModel]) -> String {
    let mut fields: Vec<&FieldModel> = fields.iter().collect();
    fields.sort_by(|a, b| a.field.cmp(&b.field));
    let properties: Vec<String> = fields.into_iter().map(render_property).collect();
    let class = format!(
        "    public partial class {class} : INotifyPropertyChanged\n    {{\n        public event PropertyChangedEventHandler PropertyChanged;\n\n{properties}\n    }}\n",
        class = key.class,
        properties = properties.join("\n\n"),
    );
    if key.namespace.is_empty() {
        format!("using System.ComponentModel;\n\n{class}")
    } else {
        format!(
            "using System.ComponentModel;\n\nnamespace {namespace}\n{{\n{class}}}\n",
            namespace = key.namespace
        )
    }
}

/// Artifact name for a class's properties.
pub fn artifact_name(key: &ClassKey) -> String {
    format!("{}_AutoNotify.g.cs", key.class)
}

/// Registers the AutoNotify generator on `builder`.
pub fn register(builder: &PipelineBuilder) {
    let fields = builder
        .syntax()
        .where_kind("field")
        .filter(|fragment| fragment.marker == AUTO_NOTIFY_ATTRIBUTE)
        .try_map(to_property_model);
    let classes = fields.group_by(|field| ClassKey {
        namespace: field.namespace.clone(),
        class: field.class.clone(),
    });

    builder.register_output(&classes, |ctx, group| {
        ctx.add_artifact(artifact_name(&group.key), render_class(&group.key, &group.members))?;
        Ok(())
    });

    let class_count = classes.map(|group| group.key.clone()).collect();
    builder.register_output(&class_count, |ctx, classes| {
        ctx.report(Diagnostic::warning(
            GENERATOR_INFO,
            "Generator",
            format!("Processing AutoNotify fields {}", classes.len()),
        ));
        Ok(())
    });
}
