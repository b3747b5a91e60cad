//! Implements `[Generated]` partial methods with a logging body.

use weft_engine::{PipelineBuilder, SyntaxFragment, TransformError};

use crate::inputs::GENERATED_ATTRIBUTE;

/// The method to implement and where it lives.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodModel {
    /// Namespace of the containing class.
    pub namespace: String,
    /// Containing class.
    pub class: String,
    /// Method name.
    pub method: String,
}

/// Builds the model for one method fragment.
pub fn to_method_model(fragment: &SyntaxFragment) -> Result<MethodModel, TransformError> {
    let get = |key: &str| {
        fragment
            .property(key)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .ok_or_else(|| TransformError::new(format!("method `{}` has no `{key}`", fragment.id)))
    };
    Ok(MethodModel {
        namespace: fragment.property("namespace").unwrap_or_default().to_string(),
        class: get("class")?,
        method: get("name")?,
    })
}

/// Renders the implementing partial class.
pub fn render(model: &MethodModel) -> String {
    let header = if model.namespace.is_empty() {
        String::new()
    } else {
        format!("namespace {};\n", model.namespace)
    };
    format!(
        r#"{header}public partial class {class}
{{
    public partial void {method}()
    {{
        Console.WriteLine("{class}.{method} Generated");
    }}
}}
"#,
        class = model.class,
        method = model.method,
    )
}

/// Registers the partial-method generator on `builder`.
pub fn register(builder: &PipelineBuilder) {
    let methods = builder
        .syntax()
        .where_kind("method")
        .filter(|fragment| fragment.marker == GENERATED_ATTRIBUTE)
        .try_map(to_method_model);
    builder.register_output(&methods, |ctx, model| {
        ctx.add_artifact(format!("{}_{}.g.cs", model.class, model.method), render(model))?;
        Ok(())
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::generated_method;

    #[test]
    fn renders_method_body() {
        let model = to_method_model(&generated_method("GeneratedNamespace", "UserClass", "UserMethod")).unwrap();
        let text = render(&model);
        assert!(text.starts_with("namespace GeneratedNamespace;\n"));
        assert!(text.contains("public partial void UserMethod()"));
        assert!(text.contains("Console.WriteLine(\"UserClass.UserMethod Generated\");"));
    }

    #[test]
    fn missing_class_fails() {
        let mut fragment = generated_method("N", "C", "M");
        fragment.properties.remove("class");
        assert!(to_method_model(&fragment).is_err());
    }
}
