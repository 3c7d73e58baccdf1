//! JSON messages exchanged between the invoker and a worker.
//!
//! Every message carries a `type` discriminator. A job answers with zero or
//! more `updateProgress` messages followed by exactly one terminal message.

use crate::application::backtest::{BacktestReport, CurrentPrediction};
use crate::application::pipeline::GeneratedData;
use crate::application::training::TrainingOutcome;
use crate::domain::dataset::{AlignedRecord, ProgressEvent};
use crate::domain::errors::ProtocolError;
use crate::domain::market::DateRange;
use crate::domain::task::TrainingTask;
use serde::{Deserialize, Serialize};

/// Request name reported when a message cannot be decoded
pub const UNKNOWN_REQUEST: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerRequest {
    GenerateData {
        #[serde(alias = "data", alias = "config")]
        task: TrainingTask,
    },
    StartTrain {
        #[serde(alias = "config")]
        task: TrainingTask,
        /// Previously generated records; generated on the fly when absent
        #[serde(default, alias = "data")]
        records: Option<Vec<AlignedRecord>>,
    },
    BackTesting {
        #[serde(alias = "config")]
        task: TrainingTask,
        range: DateRange,
    },
    PredictCurrent {
        #[serde(alias = "config")]
        task: TrainingTask,
        range: DateRange,
    },
}

impl WorkerRequest {
    pub fn name(&self) -> &'static str {
        match self {
            WorkerRequest::GenerateData { .. } => "generateData",
            WorkerRequest::StartTrain { .. } => "startTrain",
            WorkerRequest::BackTesting { .. } => "backTesting",
            WorkerRequest::PredictCurrent { .. } => "predictCurrent",
        }
    }

    pub fn task(&self) -> &TrainingTask {
        match self {
            WorkerRequest::GenerateData { task }
            | WorkerRequest::StartTrain { task, .. }
            | WorkerRequest::BackTesting { task, .. }
            | WorkerRequest::PredictCurrent { task, .. } => task,
        }
    }

    /// Terminal response type that completes this request
    pub fn expected_response(&self) -> &'static str {
        match self {
            WorkerRequest::GenerateData { .. } => "generateDataOk",
            WorkerRequest::StartTrain { .. } => "trainOk",
            WorkerRequest::BackTesting { .. } => "backTestingOk",
            WorkerRequest::PredictCurrent { .. } => "predictCurrentOk",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerResponse {
    GenerateDataOk { data: GeneratedData },
    UpdateProgress(ProgressEvent),
    TrainOk { data: TrainingOutcome },
    BackTestingOk { data: BacktestReport },
    PredictCurrentOk { data: CurrentPrediction },
    Failed { request: String, error: String },
}

impl WorkerResponse {
    pub fn name(&self) -> &'static str {
        match self {
            WorkerResponse::GenerateDataOk { .. } => "generateDataOk",
            WorkerResponse::UpdateProgress(_) => "updateProgress",
            WorkerResponse::TrainOk { .. } => "trainOk",
            WorkerResponse::BackTestingOk { .. } => "backTestingOk",
            WorkerResponse::PredictCurrentOk { .. } => "predictCurrentOk",
            WorkerResponse::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkerResponse::UpdateProgress(_))
    }
}

pub fn encode<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
    serde_json::to_string(message).map_err(|e| ProtocolError::Encode(e.to_string()))
}

pub fn decode_request(text: &str) -> Result<WorkerRequest, ProtocolError> {
    serde_json::from_str(text).map_err(|e| ProtocolError::Decode(e.to_string()))
}

pub fn decode_response(text: &str) -> Result<WorkerResponse, ProtocolError> {
    serde_json::from_str(text).map_err(|e| ProtocolError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task::fixtures::task;
    use chrono::NaiveDate;

    #[test]
    fn test_request_tags() {
        let req = WorkerRequest::BackTesting {
            task: task(),
            range: DateRange {
                start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            },
        };
        let json: serde_json::Value = serde_json::from_str(&encode(&req).unwrap()).unwrap();
        assert_eq!(json["type"], "backTesting");
        assert_eq!(json["range"]["start"], "2024-01-01");
        assert_eq!(req.expected_response(), "backTestingOk");
    }

    #[test]
    fn test_start_train_accepts_config_alias() {
        let text = serde_json::json!({
            "type": "startTrain",
            "config": serde_json::to_value(task()).unwrap(),
        })
        .to_string();
        match decode_request(&text).unwrap() {
            WorkerRequest::StartTrain { task: t, records } => {
                assert_eq!(t.name, "ndx-trend");
                assert!(records.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_progress_is_flat_and_not_terminal() {
        let msg = WorkerResponse::UpdateProgress(ProgressEvent {
            epoch: 3,
            loss: 0.5,
            accuracy: 0.75,
        });
        let json: serde_json::Value = serde_json::from_str(&encode(&msg).unwrap()).unwrap();
        assert_eq!(json["type"], "updateProgress");
        assert_eq!(json["epoch"], 3);
        assert!(!msg.is_terminal());
        assert_eq!(decode_response(&json.to_string()).unwrap(), msg);
    }

    #[test]
    fn test_malformed_request() {
        assert!(matches!(
            decode_request("{\"type\":\"launchRockets\"}"),
            Err(ProtocolError::Decode(_))
        ));
        assert!(matches!(decode_request("not json"), Err(ProtocolError::Decode(_))));
    }
}
