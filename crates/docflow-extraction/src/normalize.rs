//! Line-item key normalization step (`normalize_line_items`).

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;

use docflow_core::context::WorkflowContext;
use docflow_core::error::Result as CoreResult;
use docflow_core::registry::Handler;

/// Default bound on concurrent per-item normalization when the DAG config
/// doesn't override it.
const DEFAULT_MAX_CONCURRENCY: usize = 10;

fn normalize_one(item: Value) -> Value {
    let Value::Object(mut map) = item else {
        return item;
    };
    if let Some(qty) = map.remove("qty") {
        map.entry("quantity").or_insert(qty);
    }
    if let Some(unit_price) = map.remove("unitPrice") {
        map.entry("unit_price").or_insert(unit_price);
    }
    Value::Object(map)
}

/// The `normalize_line_items` step: renames legacy key spellings
/// (`qty`→`quantity`, `unitPrice`→`unit_price`) on each entry of
/// `ctx.fields.line_items`, only when the canonical key is absent. A no-op
/// if `line_items` is missing, not a list, or empty.
pub struct NormalizeLineItemsStep {
    max_concurrency: usize,
}

impl NormalizeLineItemsStep {
    /// Build the step with an explicit concurrency bound.
    #[must_use]
    pub fn new(max_concurrency: Option<usize>) -> Self {
        Self {
            max_concurrency: max_concurrency.unwrap_or(DEFAULT_MAX_CONCURRENCY),
        }
    }
}

impl Default for NormalizeLineItemsStep {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl Handler for NormalizeLineItemsStep {
    async fn run(&self, ctx: &mut WorkflowContext, _cfg: &Value) -> CoreResult<()> {
        let Some(Value::Array(items)) = ctx.fields.get("line_items").cloned() else {
            return Ok(());
        };
        if items.is_empty() {
            return Ok(());
        }

        let normalized: Vec<Value> = stream::iter(items)
            .map(|item| async move { normalize_one(item) })
            .buffered(self.max_concurrency.max(1))
            .collect()
            .await;

        ctx.fields.insert("line_items".to_string(), Value::Array(normalized));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn renames_legacy_keys_when_canonical_absent() {
        let mut ctx = WorkflowContext::new("j", "d", "application/pdf", Vec::new());
        ctx.fields.insert(
            "line_items".to_string(),
            json!([{"qty": 2, "unitPrice": 9.5}, {"quantity": 3, "qty": 99}]),
        );

        NormalizeLineItemsStep::default().run(&mut ctx, &Value::Null).await.expect("runs");

        let items = ctx.fields["line_items"].as_array().expect("array");
        assert_eq!(items[0]["quantity"], json!(2));
        assert_eq!(items[0]["unit_price"], json!(9.5));
        // canonical key already present: qty is dropped, not overwritten.
        assert_eq!(items[1]["quantity"], json!(3));
    }

    #[tokio::test]
    async fn missing_line_items_is_noop() {
        let mut ctx = WorkflowContext::new("j", "d", "application/pdf", Vec::new());
        NormalizeLineItemsStep::default().run(&mut ctx, &Value::Null).await.expect("runs");
        assert!(!ctx.fields.contains_key("line_items"));
    }

    #[tokio::test]
    async fn empty_line_items_is_noop() {
        let mut ctx = WorkflowContext::new("j", "d", "application/pdf", Vec::new());
        ctx.fields.insert("line_items".to_string(), json!([]));
        NormalizeLineItemsStep::default().run(&mut ctx, &Value::Null).await.expect("runs");
        assert_eq!(ctx.fields["line_items"], json!([]));
    }
}
