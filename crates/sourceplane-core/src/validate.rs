use crate::composition::CompositionRegistry;
use crate::error::{PlanError, Result};
use crate::normalize::NormalizedIntent;
use serde_json::json;

/// Check every component against its composition's compiled schema.
///
/// The instance handed to the validator is the component's identity plus
/// its raw (pre-merge) inputs: `{ name, type, inputs, domain, labels }`.
pub fn validate_components(
    intent: &NormalizedIntent,
    registry: &CompositionRegistry,
) -> Result<()> {
    for component in &intent.intent.components {
        let composition = registry.get(&component.type_name).ok_or_else(|| {
            PlanError::UnknownType {
                component: component.name.clone(),
                composition: component.type_name.clone(),
            }
        })?;

        let inputs = serde_json::to_value(&component.inputs).map_err(|e| {
            PlanError::SchemaValidation {
                component: component.name.clone(),
                composition: component.type_name.clone(),
                detail: format!("inputs are not schema-checkable: {e}"),
            }
        })?;

        let instance = json!({
            "name": component.name,
            "type": component.type_name,
            "inputs": inputs,
            "domain": component.domain,
            "labels": component.labels,
        });

        let mut schema_errors = composition.schema.iter_errors(&instance);
        if let Some(error) = schema_errors.next() {
            return Err(PlanError::SchemaValidation {
                component: component.name.clone(),
                composition: component.type_name.clone(),
                detail: format!("{error} (at instance path '{}')", error.instance_path),
            });
        }
    }

    Ok(())
}
