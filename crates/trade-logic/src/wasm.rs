//! WASM bindings for the browser front-end

#![cfg(feature = "wasm")]

use wasm_bindgen::prelude::*;

use crate::campaign::{run_simulation_campaign, CampaignConfig, CancellationToken, SilentObserver};
use crate::duration::{DurationModel, DurationParams};
use crate::payoff::GameDefinition;
use crate::phase::{play_full_game, GameConfig};
use crate::profile::{resolve_profile, ComputerProfile, ProfileCatalog};
use crate::strategy::StrategyKind;

fn to_js<T: serde::Serialize>(value: &T) -> Result<JsValue, JsError> {
    serde_wasm_bindgen::to_value(value).map_err(|e| JsError::new(&format!("Serialization error: {}", e)))
}

/// Play a whole game
///
/// # Arguments
/// * `config_json` - JSON serialized GameConfig
///
/// # Returns
/// GameOutcome with the round-by-round history
#[wasm_bindgen]
pub fn play_game(config_json: &str) -> Result<JsValue, JsError> {
    let config: GameConfig =
        serde_json::from_str(config_json).map_err(|e| JsError::new(&format!("Invalid game config: {}", e)))?;
    let outcome = play_full_game(&config).map_err(|e| JsError::new(&e.to_string()))?;
    to_js(&outcome)
}

/// Run a simulation campaign
///
/// Runs always execute sequentially here; the browser has no thread pool.
#[wasm_bindgen]
pub fn run_campaign(config_json: &str) -> Result<JsValue, JsError> {
    let mut config: CampaignConfig = serde_json::from_str(config_json)
        .map_err(|e| JsError::new(&format!("Invalid campaign config: {}", e)))?;
    config.parallel = false;
    let report = run_simulation_campaign(&config, &SilentObserver, &CancellationToken::new())
        .map_err(|e| JsError::new(&e.to_string()))?;
    to_js(&report)
}

#[derive(serde::Serialize)]
struct StrategyInfo {
    id: &'static str,
    description: &'static str,
}

/// Get all available strategy kinds
#[wasm_bindgen]
pub fn get_strategy_types() -> Result<JsValue, JsError> {
    let types: Vec<StrategyInfo> = StrategyKind::ALL
        .iter()
        .map(|kind| StrategyInfo {
            id: kind.as_str(),
            description: kind.describe(),
        })
        .collect();
    to_js(&types)
}

/// Get the built-in computer profiles
#[wasm_bindgen]
pub fn get_profiles() -> Result<JsValue, JsError> {
    let catalog = ProfileCatalog::builtin();
    let profiles: Vec<&ComputerProfile> = catalog.profiles().collect();
    to_js(&profiles)
}

/// Phase boundaries of a profile for a game of `total_rounds`
#[wasm_bindgen]
pub fn resolve_phases(profile_json: &str, total_rounds: u32) -> Result<JsValue, JsError> {
    let profile: ComputerProfile =
        serde_json::from_str(profile_json).map_err(|e| JsError::new(&format!("Invalid profile: {}", e)))?;
    let boundaries = resolve_profile(&profile, total_rounds).map_err(|e| JsError::new(&e.to_string()))?;
    to_js(&boundaries)
}

#[derive(serde::Serialize)]
struct ValidationResult {
    valid: bool,
    complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Validate a game definition
///
/// Returns `{valid, complete}` or `{valid: false, error: "..."}`.
/// Never throws: validation errors are returned as structured data.
#[wasm_bindgen]
pub fn validate_game_definition(definition_json: &str) -> JsValue {
    let model = GameDefinition::from_json(definition_json).and_then(GameDefinition::into_model);
    let result = match model {
        Ok(model) => ValidationResult {
            valid: true,
            complete: model.is_complete(),
            error: None,
        },
        Err(e) => ValidationResult {
            valid: false,
            complete: false,
            error: Some(e.to_string()),
        },
    };
    serde_wasm_bindgen::to_value(&result).unwrap_or(JsValue::NULL)
}

#[derive(serde::Serialize)]
struct DurationStats {
    min_rounds: u32,
    max_rounds: u32,
    negotiable_q: f64,
    entrenched_q: f64,
    negotiable_mean: f64,
    entrenched_mean: f64,
    expected_rounds: f64,
}

/// Calibrated duration mixture for the given bounds and target mean
#[wasm_bindgen]
pub fn get_duration_stats(min_rounds: u32, max_rounds: u32, mean_rounds: f64) -> Result<JsValue, JsError> {
    let params = DurationParams::new(min_rounds, max_rounds, mean_rounds);
    let model = DurationModel::new(params).map_err(|e| JsError::new(&e.to_string()))?;
    let negotiable_mean = model.negotiable.clamped_mean(min_rounds, max_rounds);
    let entrenched_mean = model.entrenched.clamped_mean(min_rounds, max_rounds);
    let w = params.negotiable_weight;

    to_js(&DurationStats {
        min_rounds,
        max_rounds,
        negotiable_q: model.negotiable.q,
        entrenched_q: model.entrenched.q,
        negotiable_mean,
        entrenched_mean,
        expected_rounds: w * negotiable_mean + (1.0 - w) * entrenched_mean,
    })
}
