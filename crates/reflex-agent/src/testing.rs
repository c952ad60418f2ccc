//! Scripted backends shared by the unit tests

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use reflex_ai::{BackendKind, Content, ModelBackend, ModelRequest, ModelResponse, Usage};
use serde_json::Value;

type Scripted = reflex_ai::Result<ModelResponse>;

const ANY_MODEL: &str = "*";

/// A backend that replays canned responses.
///
/// Responses can be queued per model name so a reflection run can give its
/// draft, critique and revision steps separate scripts. When a queue runs dry
/// the backend answers with the text "done".
pub struct ScriptedBackend {
    queues: Mutex<HashMap<String, VecDeque<Scripted>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedBackend {
    pub fn new(responses: Vec<Scripted>) -> Self {
        Self::routed(vec![(ANY_MODEL, responses)])
    }

    pub fn routed(routes: Vec<(&str, Vec<Scripted>)>) -> Self {
        Self {
            queues: Mutex::new(
                routes
                    .into_iter()
                    .map(|(model, responses)| (model.to_string(), responses.into()))
                    .collect(),
            ),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn calls_for(&self, model: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.model == model)
            .count()
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Responses
    }

    async fn complete(&self, request: &ModelRequest) -> reflex_ai::Result<ModelResponse> {
        self.requests.lock().push(request.clone());
        let next = {
            let mut queues = self.queues.lock();
            let key = if queues.contains_key(&request.model) {
                request.model.clone()
            } else {
                ANY_MODEL.to_string()
            };
            queues.get_mut(&key).and_then(|q| q.pop_front())
        };
        next.unwrap_or_else(|| text("done"))
    }
}

/// A final-answer response
pub fn text(s: &str) -> Scripted {
    let mut response = ModelResponse::new(vec![Content::text(s)]);
    response.metadata.usage = Usage {
        input: 10,
        output: 5,
        reasoning: 0,
    };
    Ok(response)
}

/// A response requesting tools, preceded by an opaque reasoning item
pub fn tool_calls(calls: &[(&str, &str, Value)]) -> Scripted {
    let mut content = vec![Content::opaque(serde_json::json!({
        "type": "reasoning",
        "id": "rs_test",
        "summary": []
    }))];
    content.extend(
        calls
            .iter()
            .map(|(id, name, args)| Content::tool_call(*id, *name, args.clone())),
    );
    Ok(ModelResponse::new(content))
}
