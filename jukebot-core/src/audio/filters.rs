//! Filter chain applied to a freshly opened stream before it is handed to the
//! voice output. Stage order is fixed: bass boost, then nightcore tempo, then
//! vaporwave tempo. Both tempo stages may be active at once, in which case they
//! compose.

use jukebot_common::models::playback::{FilterSettings, FilterStage};
use jukebot_common::traits::playback_traits::Filterable;

pub const BASS_BOOST_GAIN_DB: f32 = 10.0;
pub const NIGHTCORE_TEMPO: f32 = 1.2;
pub const VAPORWAVE_TEMPO: f32 = 0.8;

/// Sample rate the ffmpeg graph resamples back to after a tempo change.
pub const OUTPUT_SAMPLE_RATE: u32 = 48_000;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterChain {
    stages: Vec<FilterStage>,
}

impl FilterChain {
    pub fn from_settings(settings: &FilterSettings) -> Self {
        let mut stages = Vec::new();
        if settings.bass_boost {
            stages.push(FilterStage::BassBoost { gain_db: BASS_BOOST_GAIN_DB });
        }
        if settings.nightcore {
            stages.push(FilterStage::Tempo(NIGHTCORE_TEMPO));
        }
        if settings.vaporwave {
            stages.push(FilterStage::Tempo(VAPORWAVE_TEMPO));
        }
        Self { stages }
    }

    pub fn stages(&self) -> &[FilterStage] {
        &self.stages
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Combined playback rate of all tempo stages.
    pub fn tempo_factor(&self) -> f32 {
        self.stages
            .iter()
            .map(|s| match s {
                FilterStage::Tempo(f) => *f,
                FilterStage::BassBoost { .. } => 1.0,
            })
            .product()
    }

    pub fn apply<S: Filterable>(&self, stream: S) -> S {
        self.stages.iter().fold(stream, |s, stage| match *stage {
            FilterStage::BassBoost { gain_db } => s.bass_boost(gain_db),
            FilterStage::Tempo(factor) => s.tempo(factor),
        })
    }
}

/// Wrap `stream` with every filter enabled in `settings`.
pub fn apply_filters<S: Filterable>(stream: S, settings: &FilterSettings) -> S {
    FilterChain::from_settings(settings).apply(stream)
}

/// ffmpeg `-af` expression for a single stage.
pub fn ffmpeg_expr(stage: &FilterStage) -> String {
    match stage {
        FilterStage::BassBoost { gain_db } => format!("bass=g={gain_db}:f=110:w=0.6"),
        FilterStage::Tempo(factor) => format!(
            "asetrate={rate}*{factor},aresample={rate}",
            rate = OUTPUT_SAMPLE_RATE
        ),
    }
}

/// Comma-joined filter graph, or `None` when there is nothing to apply.
pub fn ffmpeg_filtergraph(stages: &[FilterStage]) -> Option<String> {
    if stages.is_empty() {
        return None;
    }
    Some(stages.iter().map(ffmpeg_expr).collect::<Vec<_>>().join(","))
}
