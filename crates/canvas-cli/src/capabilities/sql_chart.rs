//! Chart configuration capability

use async_trait::async_trait;
use canvas_assistant::{Capability, CapabilityError};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::SharedHostState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Line,
    Scatter,
}

impl ChartType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartType::Bar => "bar",
            ChartType::Line => "line",
            ChartType::Scatter => "scatter",
        }
    }
}

/// A chart the host should render from the result of `sql`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartConfig {
    pub sql: String,
    pub chart_type: ChartType,
    pub x_field: String,
    pub y_field: String,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_group: Option<String>,
}

/// `sql_chart`: record the query and layout of a chart
pub struct SqlChartCapability {
    state: SharedHostState,
}

impl SqlChartCapability {
    pub fn new(state: SharedHostState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Capability for SqlChartCapability {
    fn name(&self) -> &str {
        "sql_chart"
    }

    fn description(&self) -> &str {
        "Set the SQL query to use to create a chart."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "sql": {
                    "type": "string",
                    "description": "SQL query whose rows feed the chart"
                },
                "chartType": {
                    "type": "string",
                    "enum": ["bar", "line", "scatter"],
                    "description": "Kind of chart to draw"
                },
                "xField": {
                    "type": "string",
                    "description": "sql column for the x axis"
                },
                "yField": {
                    "type": "string",
                    "description": "sql column for the y axis"
                },
                "title": { "type": "string" },
                "xLabel": { "type": "string" },
                "yLabel": { "type": "string" },
                "datasetGroup": {
                    "type": "string",
                    "description": "sql column to group datasets by, one dataset per distinct value"
                }
            },
            "required": ["sql", "chartType", "xField", "yField", "title", "xLabel", "yLabel"]
        })
    }

    async fn invoke(&self, arguments: Value) -> Result<Value, CapabilityError> {
        let config: ChartConfig = serde_json::from_value(arguments.clone())
            .map_err(|e| CapabilityError::InvalidArguments(e.to_string()))?;

        tracing::info!(
            "Chart set: {} chart of {} against {}",
            config.chart_type.as_str(),
            config.y_field,
            config.x_field
        );
        self.state.lock().chart = Some(config);

        Ok(json!({ "status": "success", "params": arguments }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::host_registry;

    fn chart_args() -> Value {
        json!({
            "sql": "SELECT term, AVG(score) AS avg FROM grades GROUP BY term",
            "chartType": "line",
            "xField": "term",
            "yField": "avg",
            "title": "Average score",
            "xLabel": "Term",
            "yLabel": "Score"
        })
    }

    #[tokio::test]
    async fn test_records_chart() {
        let state = SharedHostState::default();
        let capability = SqlChartCapability::new(state.clone());

        let result = capability.invoke(chart_args()).await.unwrap();

        assert_eq!(result["status"], "success");
        assert_eq!(result["params"], chart_args());
        let chart = state.lock().chart.clone().unwrap();
        assert_eq!(chart.chart_type, ChartType::Line);
        assert_eq!(chart.x_field, "term");
        assert!(chart.dataset_group.is_none());
    }

    #[tokio::test]
    async fn test_dataset_group_kept() {
        let state = SharedHostState::default();
        let capability = SqlChartCapability::new(state.clone());
        let mut args = chart_args();
        args["datasetGroup"] = json!("section");

        capability.invoke(args).await.unwrap();

        let chart = state.lock().chart.clone().unwrap();
        assert_eq!(chart.dataset_group.as_deref(), Some("section"));
        assert_eq!(serde_json::to_value(&chart).unwrap()["datasetGroup"], "section");
    }

    #[test]
    fn test_schema_rejects_unknown_chart_type() {
        let state = SharedHostState::default();
        let registry = host_registry(&state).unwrap();
        let mut args = chart_args();

        assert!(registry.validate("sql_chart", &args).is_ok());

        args["chartType"] = json!("pie");
        let err = registry.validate("sql_chart", &args).unwrap_err();
        assert!(matches!(err, CapabilityError::Validation(_)));
    }

    #[test]
    fn test_schema_requires_fields() {
        let state = SharedHostState::default();
        let registry = host_registry(&state).unwrap();

        let err = registry
            .validate("sql_chart", &json!({ "sql": "SELECT 1" }))
            .unwrap_err();
        assert!(err.to_string().contains("Argument validation failed"));
    }
}
