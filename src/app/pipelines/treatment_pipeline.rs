use crate::config::toml_config::ProjectConfig;
use crate::domain::model::PipelineReport;
use crate::domain::ports::{Pipeline, Storage};
use crate::spatial::vector;
use crate::utils::error::{GieError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreatmentRow {
    #[serde(rename = "shapeID")]
    pub shape_id: String,
    #[serde(rename = "shapeName")]
    pub shape_name: Option<String>,
    pub treatment: u8,
}

/// 隨機挑出 floor(share * n) 個單位標為 1
pub fn assign_treatment<R: Rng + ?Sized>(units: usize, share: f64, rng: &mut R) -> Vec<u8> {
    let treated = ((share * units as f64).floor() as usize).min(units);
    let mut flags = vec![0u8; units];
    for index in rand::seq::index::sample(rng, units, treated).iter() {
        flags[index] = 1;
    }
    flags
}

/// 為子層行政區產生模擬處理組名單；`storage` 以 base_path 為根
pub struct TreatmentPipeline<S: Storage> {
    storage: S,
    boundary_key: String,
    output_key: String,
    id_field: String,
    share: f64,
    seed: Option<u64>,
}

impl<S: Storage> TreatmentPipeline<S> {
    pub fn new(storage: S, project: &ProjectConfig) -> Self {
        let integrate = &project.integrate;
        Self {
            storage,
            boundary_key: project.boundary_key(&integrate.iso3, &integrate.child_level),
            output_key: project.treatment_path.clone(),
            id_field: integrate.id_field.clone(),
            share: project.treatment.share,
            seed: project.treatment.seed,
        }
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

#[async_trait::async_trait]
impl<S: Storage> Pipeline for TreatmentPipeline<S> {
    type Extracted = Vec<(String, Option<String>)>;
    type Transformed = Vec<TreatmentRow>;

    fn name(&self) -> &str {
        "treatment"
    }

    async fn extract(&self) -> Result<Vec<(String, Option<String>)>> {
        if !self.storage.exists(&self.boundary_key).await {
            return Err(GieError::MissingInput {
                path: self.storage.locate(&self.boundary_key),
            });
        }
        let bytes = self.storage.read_file(&self.boundary_key).await?;
        let collection = vector::parse_feature_collection(&bytes)?;

        collection
            .features
            .iter()
            .map(|feature| {
                let shape_id = feature
                    .property(&self.id_field)
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| GieError::GeometryError {
                        message: format!("Feature without {}", self.id_field),
                    })?;
                let shape_name = feature
                    .property("shapeName")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                Ok((shape_id.to_string(), shape_name))
            })
            .collect()
    }

    async fn transform(&self, data: Vec<(String, Option<String>)>) -> Result<Vec<TreatmentRow>> {
        let flags = assign_treatment(data.len(), self.share, &mut self.rng());
        let rows: Vec<TreatmentRow> = data
            .into_iter()
            .zip(flags)
            .map(|((shape_id, shape_name), treatment)| TreatmentRow {
                shape_id,
                shape_name,
                treatment,
            })
            .collect();

        tracing::info!(
            "🎲 {} of {} units assigned to treatment",
            rows.iter().filter(|r| r.treatment == 1).count(),
            rows.len()
        );
        Ok(rows)
    }

    async fn load(&self, result: Vec<TreatmentRow>) -> Result<PipelineReport> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for row in &result {
            writer.serialize(row)?;
        }
        let data = writer.into_inner().map_err(|e| GieError::ProcessingError {
            message: format!("Failed to finish treatment CSV: {}", e),
        })?;

        self.storage.write_file(&self.output_key, &data).await?;
        tracing::info!("✅ Treatment written to {}", self.storage.locate(&self.output_key));

        let mut report = PipelineReport::new(self.name());
        report.processed = result.len();
        report.outputs.push(self.storage.locate(&self.output_key));
        Ok(report)
    }
}
