use crate::config::toml_config::{IntegrateConfig, ProjectConfig};
use crate::domain::model::PipelineReport;
use crate::domain::ports::{Pipeline, Storage};
use crate::spatial::overlay::{self, AdminUnit};
use crate::spatial::geotiff::GeoTiffReader;
use crate::spatial::{vector, zonal, Raster};
use crate::utils::error::{GieError, Result};
use geo::{coord, BoundingRect, MultiPolygon, Rect};
use geojson::{Feature, FeatureCollection};
use serde_json::{Map, Number, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;

#[derive(Debug)]
pub struct IntegrateInputs {
    pub children: Vec<AdminUnit>,
    pub parents: Vec<AdminUnit>,
    /// 子區 ID -> treatment 值
    pub treatment: HashMap<String, Value>,
    /// (raster id, GeoTIFF 路徑)，逐一開啟
    pub rasters: Vec<(String, PathBuf)>,
}

/// 子區為列的屬性表，幾何與列一一對應
#[derive(Debug, Clone)]
pub struct IntegratedTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub geometries: Vec<MultiPolygon<f64>>,
}

impl IntegratedTable {
    pub fn to_csv(&self) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(cell_text))?;
        }
        writer.into_inner().map_err(|e| GieError::ProcessingError {
            message: format!("Failed to finish CSV output: {}", e),
        })
    }

    pub fn to_feature_collection(&self) -> FeatureCollection {
        let features = self
            .rows
            .iter()
            .zip(&self.geometries)
            .map(|(row, geometry)| {
                let properties: Map<String, Value> = self
                    .columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect();
                Feature {
                    bbox: None,
                    geometry: Some(geojson::Geometry::new(geojson::Value::from(geometry))),
                    id: None,
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
            .collect();

        FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        }
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// CSV 儲存格轉成 JSON 值，盡量保留數字型別
fn parse_cell(text: &str) -> Value {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Some(n) = trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(n);
    }
    Value::String(trimmed.to_string())
}

pub fn read_treatment_csv(bytes: &[u8], id_field: &str) -> Result<HashMap<String, Value>> {
    let mut reader = csv::Reader::from_reader(bytes);
    let headers = reader.headers()?.clone();

    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| GieError::ProcessingError {
                message: format!("Treatment CSV has no `{}` column", name),
            })
    };
    let id_idx = column(id_field)?;
    let treatment_idx = column("treatment")?;

    let mut treatment = HashMap::new();
    for record in reader.records() {
        let record = record?;
        if let Some(id) = record.get(id_idx) {
            let value = record.get(treatment_idx).map(parse_cell).unwrap_or(Value::Null);
            treatment.entry(id.to_string()).or_insert(value);
        }
    }
    Ok(treatment)
}

fn column_names(units: &[AdminUnit]) -> Vec<String> {
    let names: BTreeSet<&String> = units.iter().flat_map(|u| u.properties.keys()).collect();
    names.into_iter().cloned().collect()
}

/// 同名欄位加上層級後綴，例如 `shapeID` -> `shapeID_adm2`
fn output_names(own: &[String], other: &[String], suffix: &str) -> Vec<String> {
    own.iter()
        .map(|name| {
            if other.contains(name) {
                format!("{}_{}", name, suffix)
            } else {
                name.clone()
            }
        })
        .collect()
}

/// 空間連結、重疊檢查、treatment 合併與分區統計
pub fn build_table(
    inputs: IntegrateInputs,
    settings: &IntegrateConfig,
    category_names: &BTreeMap<u8, String>,
) -> Result<IntegratedTable> {
    let IntegrateInputs {
        mut children,
        mut parents,
        treatment,
        rasters,
    } = inputs;

    for unit in children.iter_mut().chain(parents.iter_mut()) {
        for field in &settings.drop_fields {
            unit.properties.remove(field);
        }
    }

    let child_suffix = settings.child_level.to_lowercase();
    let parent_suffix = settings.parent_level.to_lowercase();
    let child_columns = column_names(&children);
    let parent_columns = column_names(&parents);
    let child_out = output_names(&child_columns, &parent_columns, &child_suffix);
    let parent_out = output_names(&parent_columns, &child_columns, &parent_suffix);

    let mut matches = overlay::assign_parents(&children, &parents);
    overlay::check_overlap(&children, &matches, &settings.id_field, settings.min_overlap)?;
    tracing::info!(
        "🔗 Joined {} of {} child units to a parent",
        matches.len(),
        children.len()
    );

    matches.sort_by_cached_key(|m| children[m.child].property_str(&settings.id_field));

    let mut columns: Vec<String> = child_out.into_iter().chain(parent_out).collect();
    columns.push(format!("overlap_{}", parent_suffix));
    columns.push("treatment".to_string());

    let mut rows = Vec::with_capacity(matches.len());
    let mut geometries = Vec::with_capacity(matches.len());
    for m in &matches {
        let child = &children[m.child];
        let parent = &parents[m.parent];

        let mut row: Vec<Value> = child_columns
            .iter()
            .map(|c| child.properties.get(c).cloned().unwrap_or(Value::Null))
            .chain(
                parent_columns
                    .iter()
                    .map(|c| parent.properties.get(c).cloned().unwrap_or(Value::Null)),
            )
            .collect();
        row.push(Number::from_f64(m.overlap).map(Value::Number).unwrap_or(Value::Null));
        row.push(
            child
                .property_str(&settings.id_field)
                .and_then(|id| treatment.get(&id).cloned())
                .unwrap_or(Value::Null),
        );

        rows.push(row);
        geometries.push(child.geometry.clone());
    }

    let mut table = IntegratedTable {
        columns,
        rows,
        geometries,
    };

    // 一次只保留一年的視窗
    let bounds = combined_bounds(&table.geometries);
    for (raster_id, path) in &rasters {
        tracing::info!("📊 Zonal statistics for {}", raster_id);
        let mut reader = GeoTiffReader::open(path)?;
        let window = match &bounds {
            Some(bounds) => reader.read_bounds(bounds)?,
            None => None,
        };
        match &window {
            Some(raster) => tracing::debug!(
                "{}: read {}x{} of {}x{} cells",
                raster_id,
                raster.width,
                raster.height,
                reader.width,
                reader.height
            ),
            None => tracing::warn!("⚠️ {} does not cover any child unit", raster_id),
        }
        add_zonal_columns(
            &mut table,
            raster_id,
            window.as_ref(),
            settings.all_touched,
            category_names,
        );
    }

    Ok(table)
}

fn combined_bounds(geometries: &[MultiPolygon<f64>]) -> Option<Rect<f64>> {
    geometries
        .iter()
        .filter_map(|g| g.bounding_rect())
        .reduce(|a, b| {
            Rect::new(
                coord! { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
                coord! { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
            )
        })
}

/// 每個出現過的類別加一欄 `{raster_id}_{類別名稱}`，缺值為 0
pub fn add_zonal_columns(
    table: &mut IntegratedTable,
    raster_id: &str,
    raster: Option<&Raster>,
    all_touched: bool,
    category_names: &BTreeMap<u8, String>,
) {
    let counts: Vec<BTreeMap<u8, u64>> = match raster {
        Some(raster) => table
            .geometries
            .iter()
            .map(|g| zonal::categorical_counts(raster, g, all_touched))
            .collect(),
        None => vec![BTreeMap::new(); table.rows.len()],
    };
    let codes: BTreeSet<u8> = counts.iter().flat_map(|c| c.keys().copied()).collect();

    for code in codes {
        let label = category_names
            .get(&code)
            .cloned()
            .unwrap_or_else(|| code.to_string());
        table.columns.push(format!("{}_{}", raster_id, label));
        for (row, count) in table.rows.iter_mut().zip(&counts) {
            row.push(Value::Number(count.get(&code).copied().unwrap_or(0).into()));
        }
    }
}

/// 子層、上層邊界與土地覆蓋的整合；`storage` 以 base_path 為根
pub struct IntegratePipeline<S: Storage> {
    storage: S,
    settings: IntegrateConfig,
    child_key: String,
    parent_key: String,
    treatment_key: String,
    rasters: Vec<(String, String)>,
    category_names: BTreeMap<u8, String>,
}

impl<S: Storage> IntegratePipeline<S> {
    pub fn new(storage: S, project: &ProjectConfig) -> Result<Self> {
        let settings = project.integrate.clone();
        let rasters = project
            .landcover
            .years
            .iter()
            .map(|&year| (format!("esa_lc_{}", year), project.landcover_key(year)))
            .collect();

        Ok(Self {
            storage,
            child_key: project.boundary_key(&settings.iso3, &settings.child_level),
            parent_key: project.boundary_key(&settings.iso3, &settings.parent_level),
            treatment_key: project.treatment_path.clone(),
            rasters,
            category_names: project.landcover.category_names()?,
            settings,
        })
    }

    fn output_key(&self, extension: &str) -> String {
        format!(
            "{}/{}.{}",
            self.settings.output_dir.trim_end_matches('/'),
            self.settings.output_name,
            extension
        )
    }

    /// 檔案不存在時回報 MissingInput，否則回傳完整路徑
    async fn require(&self, key: &str) -> Result<String> {
        if !self.storage.exists(key).await {
            return Err(GieError::MissingInput {
                path: self.storage.locate(key),
            });
        }
        Ok(self.storage.locate(key))
    }

    async fn read_input(&self, key: &str) -> Result<Vec<u8>> {
        self.require(key).await?;
        self.storage.read_file(key).await
    }

    async fn read_units(&self, key: &str) -> Result<Vec<AdminUnit>> {
        let bytes = self.read_input(key).await?;
        let collection = vector::parse_feature_collection(&bytes)?;
        overlay::units_from_collection(&collection)
    }
}

#[async_trait::async_trait]
impl<S: Storage> Pipeline for IntegratePipeline<S> {
    type Extracted = IntegrateInputs;
    type Transformed = IntegratedTable;

    fn name(&self) -> &str {
        "integrate"
    }

    async fn extract(&self) -> Result<IntegrateInputs> {
        let children = self.read_units(&self.child_key).await?;
        let parents = self.read_units(&self.parent_key).await?;
        tracing::info!(
            "Loaded {} {} and {} {} units",
            children.len(),
            self.settings.child_level,
            parents.len(),
            self.settings.parent_level
        );

        let treatment_bytes = self.read_input(&self.treatment_key).await?;
        let treatment = read_treatment_csv(&treatment_bytes, &self.settings.id_field)?;

        // 柵格在 transform 時才按視窗讀取
        let mut rasters = Vec::with_capacity(self.rasters.len());
        for (raster_id, key) in &self.rasters {
            let path = self.require(key).await?;
            rasters.push((raster_id.clone(), PathBuf::from(path)));
        }

        Ok(IntegrateInputs {
            children,
            parents,
            treatment,
            rasters,
        })
    }

    async fn transform(&self, data: IntegrateInputs) -> Result<IntegratedTable> {
        let settings = self.settings.clone();
        let category_names = self.category_names.clone();
        tokio::task::spawn_blocking(move || build_table(data, &settings, &category_names))
            .await
            .map_err(|e| GieError::ProcessingError {
                message: format!("Integration task failed: {}", e),
            })?
    }

    async fn load(&self, result: IntegratedTable) -> Result<PipelineReport> {
        let csv_key = self.output_key("csv");
        let geojson_key = self.output_key("geojson");

        self.storage.write_file(&csv_key, &result.to_csv()?).await?;
        let collection = result.to_feature_collection();
        self.storage
            .write_file(&geojson_key, &serde_json::to_vec(&collection)?)
            .await?;

        tracing::info!("✅ Wrote {} rows to {}", result.rows.len(), self.storage.locate(&csv_key));

        let mut report = PipelineReport::new(self.name());
        report.processed = result.rows.len();
        report.outputs.push(self.storage.locate(&csv_key));
        report.outputs.push(self.storage.locate(&geojson_key));
        Ok(report)
    }
}
