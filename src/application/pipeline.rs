//! Risk Pipeline
//!
//! Runs every stage in order over the two input feeds and collects the
//! output tables. The run is a pure function of the inputs and parameters:
//! all randomness is seeded and parallel stages collect in input order, so
//! two runs over the same tables produce identical output.
//!
//! Stage order:
//! 1. Schema resolution and data-quality reports
//! 2. Features per granularity
//! 3. Rule calibration (global barrier) and outlier model fit
//! 4. Anomaly scoring per row
//! 5. As-of fusion into daily risk records
//! 6. Per-fund aggregation
//! 7. Next-period predictor, 30-day projection, recommendations
//! 8. Optional peer-group report

use std::time::Instant;

use thiserror::Error;

use crate::adapters::schema::{ResolvedFeed, SchemaError, SchemaResolver};
use crate::domain::{
    AnomalyScore, FeatureVector, FundRiskSummary, Granularity, InstrumentDirectory, Prediction,
    Projection, Recommendation, RiskRecord,
};
use crate::ports::{names, write_records, DatasetError, TableSink, TableSource};
use crate::strategy::{
    peer_report, score_feed, summarize_actions, ActionSummary, Evaluation, FeatureEngine,
    ForwardProjector, ModelError, OutlierModel, ParamsError, PeerReport, PipelineParams,
    QualityReport, RecommendationEngine, RiskAggregator, RiskPredictor, RuleThresholds,
    SignalFusion,
};

/// Pipeline error type
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Model fit failed: {0}")]
    ModelFit(#[from] ModelError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ParamsError),
}

impl PipelineError {
    /// Problems with the input tables rather than the models
    pub fn is_input_error(&self) -> bool {
        matches!(self, PipelineError::Schema(_) | PipelineError::Dataset(_))
    }

    pub fn is_model_fit(&self) -> bool {
        matches!(self, PipelineError::ModelFit(_))
    }
}

/// Data-quality reports for both feeds
#[derive(Debug, Clone)]
pub struct QualityOutput {
    pub daily: QualityReport,
    pub weekly: QualityReport,
}

/// Every table produced by one run
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub quality: QualityOutput,
    pub directory: InstrumentDirectory,
    pub features_daily: Vec<FeatureVector>,
    pub features_weekly: Vec<FeatureVector>,
    pub thresholds_daily: RuleThresholds,
    pub thresholds_weekly: RuleThresholds,
    pub anomalies_daily: Vec<AnomalyScore>,
    pub anomalies_weekly: Vec<AnomalyScore>,
    pub risk_records: Vec<RiskRecord>,
    pub fund_risk_summary: Vec<FundRiskSummary>,
    pub predictions: Vec<Prediction>,
    pub evaluation: Evaluation,
    pub projections: Vec<Projection>,
    pub recommendations: Vec<Recommendation>,
    pub recommendation_summary: Vec<ActionSummary>,
    pub peer_report: Option<PeerReport>,
}

impl PipelineOutput {
    /// Write every table; each write replaces the previous snapshot
    pub fn write_to(&self, sink: &dyn TableSink) -> Result<(), DatasetError> {
        write_records(sink, names::QUALITY_DAILY, &self.quality.daily)?;
        write_records(sink, names::QUALITY_WEEKLY, &self.quality.weekly)?;
        write_records(sink, names::FEATURES_DAILY, &self.features_daily)?;
        write_records(sink, names::FEATURES_WEEKLY, &self.features_weekly)?;
        write_records(sink, names::ANOMALIES_DAILY, &self.anomalies_daily)?;
        write_records(sink, names::ANOMALIES_WEEKLY, &self.anomalies_weekly)?;
        write_records(sink, names::RISK_RECORDS, &self.risk_records)?;
        write_records(sink, names::FUND_RISK_SUMMARY, &self.fund_risk_summary)?;
        write_records(sink, names::PREDICTIONS, &self.predictions)?;
        write_records(sink, names::PREDICTOR_EVALUATION, &self.evaluation)?;
        write_records(sink, names::PROJECTIONS, &self.projections)?;
        write_records(sink, names::RECOMMENDATIONS, &self.recommendations)?;
        write_records(sink, names::RECOMMENDATION_SUMMARY, &self.recommendation_summary)?;
        if let Some(ref report) = self.peer_report {
            write_records(sink, names::PEER_REPORT, report)?;
        }
        tracing::info!("output tables written");
        Ok(())
    }
}

fn timed<T>(stage: &str, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let out = f();
    tracing::info!("stage '{}' done in {:.2?}", stage, start.elapsed());
    out
}

/// Batch risk pipeline over a daily and a weekly feed
#[derive(Debug, Clone)]
pub struct RiskPipeline {
    params: PipelineParams,
    resolver: SchemaResolver,
}

impl RiskPipeline {
    pub fn new(params: PipelineParams) -> Result<Self, PipelineError> {
        params.validate()?;
        Ok(Self {
            params,
            resolver: SchemaResolver::default(),
        })
    }

    /// Only keep instrument codes matching `pattern`
    pub fn with_code_pattern(mut self, pattern: &str) -> Result<Self, PipelineError> {
        self.resolver = SchemaResolver::new(Some(pattern))?;
        Ok(self)
    }

    pub fn params(&self) -> &PipelineParams {
        &self.params
    }

    fn read_feed(
        &self,
        source: &dyn TableSource,
        table: &str,
        granularity: Granularity,
    ) -> Result<ResolvedFeed, PipelineError> {
        let rows = source
            .read_table(table)?
            .ok_or_else(|| DatasetError::MissingTable(table.to_string()))?;
        Ok(self.resolver.resolve(table, &rows, granularity)?)
    }

    /// Resolve both input tables
    pub fn load_feeds(&self, source: &dyn TableSource) -> Result<(ResolvedFeed, ResolvedFeed), PipelineError> {
        let daily = self.read_feed(source, names::DAILY, Granularity::Daily)?;
        let weekly = self.read_feed(source, names::WEEKLY, Granularity::Weekly)?;
        Ok((daily, weekly))
    }

    /// Data-quality reports only
    pub fn check(&self, source: &dyn TableSource) -> Result<QualityOutput, PipelineError> {
        let (daily, weekly) = self.load_feeds(source)?;
        Ok(Self::quality(&daily, &weekly))
    }

    fn quality(daily: &ResolvedFeed, weekly: &ResolvedFeed) -> QualityOutput {
        QualityOutput {
            daily: QualityReport::build(&daily.observations, Granularity::Daily, daily.dropped_rows),
            weekly: QualityReport::build(&weekly.observations, Granularity::Weekly, weekly.dropped_rows),
        }
    }

    /// Full run over the tables of `source`
    pub fn run(&self, source: &dyn TableSource) -> Result<PipelineOutput, PipelineError> {
        let (daily, weekly) = timed("schema", || self.load_feeds(source))?;
        self.run_feeds(&daily, &weekly)
    }

    /// Full run over already-resolved feeds
    pub fn run_feeds(&self, daily: &ResolvedFeed, weekly: &ResolvedFeed) -> Result<PipelineOutput, PipelineError> {
        let started = Instant::now();
        let p = &self.params;

        let quality = Self::quality(daily, weekly);
        let mut directory = daily.directory.clone();
        directory.merge(&weekly.directory);

        let engine = FeatureEngine::new(p.features.clone());
        let (features_daily, features_weekly) = timed("features", || {
            rayon::join(
                || engine.compute(&daily.observations, Granularity::Daily),
                || engine.compute(&weekly.observations, Granularity::Weekly),
            )
        });

        let thresholds_daily = RuleThresholds::calibrate(&features_daily.rows, Granularity::Daily, &p.rules);
        let thresholds_weekly = RuleThresholds::calibrate(&features_weekly.rows, Granularity::Weekly, &p.rules);
        tracing::debug!("daily thresholds: {:?}", thresholds_daily);
        tracing::debug!("weekly thresholds: {:?}", thresholds_weekly);

        let (anomalies_daily, anomalies_weekly) = timed("anomalies", || -> Result<_, ModelError> {
            let fallback = p.outlier.fallback_rule_threshold;
            let daily_model = OutlierModel::fit(&features_daily, &p.outlier)?;
            let weekly_model = OutlierModel::fit(&features_weekly, &p.outlier)?;
            Ok((
                score_feed(&features_daily, &thresholds_daily, &daily_model, fallback)?,
                score_feed(&features_weekly, &thresholds_weekly, &weekly_model, fallback)?,
            ))
        })?;

        let fusion = SignalFusion::new(p.fusion.clone()).with_unscored(p.outlier.fallback_rule_threshold.is_some());
        let risk_records = timed("fusion", || fusion.fuse(&anomalies_daily, &anomalies_weekly));

        let fund_risk_summary = timed("aggregation", || {
            RiskAggregator::new(p.aggregation.clone()).summarize(&risk_records, &directory)
        });

        let predictor = timed("predictor", || {
            RiskPredictor::new(p.predictor.clone()).run(&features_daily.rows, &anomalies_daily, &risk_records)
        })?;

        let projections = timed("projection", || {
            ForwardProjector::new(p.projection.clone()).project(&predictor.predictions, &directory)
        });

        let recommendations = timed("recommendation", || {
            RecommendationEngine::new(p.recommendation.clone()).recommend(&projections, &fund_risk_summary)
        });
        let recommendation_summary = summarize_actions(&recommendations);

        let peer_report = p
            .peer_group
            .as_deref()
            .map(|pattern| peer_report(pattern, &fund_risk_summary, &projections, &recommendations));

        tracing::info!(
            "pipeline finished in {:.2?}: {} risk records, {} funds, {} recommendations",
            started.elapsed(),
            risk_records.len(),
            fund_risk_summary.len(),
            recommendations.len()
        );

        Ok(PipelineOutput {
            quality,
            directory,
            features_daily: features_daily.rows,
            features_weekly: features_weekly.rows,
            thresholds_daily,
            thresholds_weekly,
            anomalies_daily,
            anomalies_weekly,
            risk_records,
            fund_risk_summary,
            predictions: predictor.predictions,
            evaluation: predictor.evaluation,
            projections,
            recommendations,
            recommendation_summary,
            peer_report,
        })
    }
}
