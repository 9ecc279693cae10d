//! Wire messages.
//!
//! Two channels carry JSON text frames:
//! - the signaling connection between the client and the relay (`SignalMessage`);
//! - the side channel between the client and the remote model (`ClientEvent`
//!   outbound, `ServerEvent` inbound).

use crate::tools::FunctionDefinition;
use serde::{Deserialize, Serialize};

/// Label of the side channel opened on the peer connection.
pub const SIDE_CHANNEL_LABEL: &str = "oai-events";

// --- Signaling ---

/// Offer/answer frames exchanged with the signaling relay.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalMessage {
    Offer { sdp: String },
    Answer { sdp: String },
}

// --- Side channel, client to model ---

/// Events the client sends over the side channel.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionUpdate },
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },
    #[serde(rename = "response.create")]
    ResponseCreate {},
}

impl ClientEvent {
    pub fn function_call_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self::ConversationItemCreate {
            item: ConversationItem::FunctionCallOutput {
                call_id: call_id.into(),
                output: output.into(),
            },
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationItem {
    FunctionCallOutput { call_id: String, output: String },
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TurnDetection {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AudioTranscription {
    pub model: String,
}

/// Session configuration sent once the side channel opens.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SessionUpdate {
    pub instructions: String,
    pub voice: String,
    pub turn_detection: TurnDetection,
    pub input_audio_transcription: AudioTranscription,
    pub output_audio_format: String,
    pub modalities: Vec<String>,
    pub tools: Vec<FunctionDefinition>,
    pub tool_choice: String,
}

impl SessionUpdate {
    /// Builds the update with the fixed voice, transcription and output format settings.
    pub fn new(
        instructions: impl Into<String>,
        voice: impl Into<String>,
        tools: Vec<FunctionDefinition>,
    ) -> Self {
        Self {
            instructions: instructions.into(),
            voice: voice.into(),
            turn_detection: TurnDetection {
                kind: "server_vad".to_string(),
            },
            input_audio_transcription: AudioTranscription {
                model: "whisper-1".to_string(),
            },
            output_audio_format: "pcm16".to_string(),
            modalities: vec!["audio".to_string(), "text".to_string()],
            tools,
            tool_choice: "auto".to_string(),
        }
    }
}

// --- Side channel, model to client ---

/// Events received over the side channel, keyed by their `type` field.
///
/// Only the kinds the session reacts to are modelled; everything else lands in
/// `Other`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Opens a tool call when the item is a `function_call`.
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded { item: OutputItem },
    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta {
        #[serde(default)]
        call_id: Option<String>,
        delta: String,
    },
    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        #[serde(default)]
        call_id: Option<String>,
    },
    #[serde(rename = "response.audio_transcript.delta")]
    AudioTranscriptDelta { delta: String },
    #[serde(rename = "response.audio_transcript.done")]
    AudioTranscriptDone { transcript: String },
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputTranscriptionCompleted { transcript: String },
    #[serde(rename = "output_audio_buffer.started")]
    OutputAudioStarted {},
    #[serde(rename = "output_audio_buffer.stopped")]
    OutputAudioStopped {},
    #[serde(rename = "error")]
    Error { error: ErrorDetail },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct OutputItem {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub call_id: Option<String>,
}

impl OutputItem {
    /// Returns `(call_id, name)` when the item opens a function call.
    pub fn as_function_call(&self) -> Option<(&str, &str)> {
        if self.kind != "function_call" {
            return None;
        }
        Some((self.call_id.as_deref()?, self.name.as_deref()?))
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorDetail {
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_signal_message_shapes() {
        let offer: SignalMessage = serde_json::from_str(r#"{"type":"offer","sdp":"X"}"#).unwrap();
        assert_eq!(offer, SignalMessage::Offer { sdp: "X".into() });

        let answer = serde_json::to_value(SignalMessage::Answer { sdp: "Y".into() }).unwrap();
        assert_eq!(answer, json!({"type": "answer", "sdp": "Y"}));

        assert!(serde_json::from_str::<SignalMessage>(r#"{"type":"ping"}"#).is_err());
    }

    #[test]
    fn test_function_call_output_then_response_create() {
        let output = serde_json::to_value(ClientEvent::function_call_output("c1", "{\"ok\":true}"))
            .unwrap();
        assert_eq!(
            output,
            json!({
                "type": "conversation.item.create",
                "item": {"type": "function_call_output", "call_id": "c1", "output": "{\"ok\":true}"}
            })
        );

        let create = serde_json::to_value(ClientEvent::ResponseCreate {}).unwrap();
        assert_eq!(create, json!({"type": "response.create"}));
    }

    #[test]
    fn test_session_update_carries_fixed_configuration() {
        let update = ClientEvent::SessionUpdate {
            session: SessionUpdate::new("Be brief.", "alloy", vec![]),
        };
        let value = serde_json::to_value(update).unwrap();

        assert_eq!(value["type"], "session.update");
        let session = &value["session"];
        assert_eq!(session["instructions"], "Be brief.");
        assert_eq!(session["voice"], "alloy");
        assert_eq!(session["turn_detection"]["type"], "server_vad");
        assert_eq!(session["input_audio_transcription"]["model"], "whisper-1");
        assert_eq!(session["output_audio_format"], "pcm16");
        assert_eq!(session["tool_choice"], "auto");
        assert_eq!(session["modalities"], json!(["audio", "text"]));
    }

    #[test]
    fn test_server_event_dispatch_keys() {
        let open: ServerEvent = serde_json::from_value(json!({
            "type": "response.output_item.added",
            "response_id": "r1",
            "item": {"id": "i1", "type": "function_call", "name": "sleep", "call_id": "c1"}
        }))
        .unwrap();
        match open {
            ServerEvent::OutputItemAdded { item } => {
                assert_eq!(item.as_function_call(), Some(("c1", "sleep")));
            }
            other => panic!("unexpected event {other:?}"),
        }

        let delta: ServerEvent = serde_json::from_value(json!({
            "type": "response.function_call_arguments.delta",
            "call_id": "c1",
            "delta": "{\"a\":"
        }))
        .unwrap();
        assert_eq!(
            delta,
            ServerEvent::FunctionCallArgumentsDelta {
                call_id: Some("c1".into()),
                delta: "{\"a\":".into()
            }
        );

        let started: ServerEvent =
            serde_json::from_value(json!({"type": "output_audio_buffer.started", "response_id": "r1"}))
                .unwrap();
        assert_eq!(started, ServerEvent::OutputAudioStarted {});

        let unknown: ServerEvent =
            serde_json::from_value(json!({"type": "session.created", "session": {}})).unwrap();
        assert_eq!(unknown, ServerEvent::Other);
    }

    #[test]
    fn test_message_item_is_not_a_call() {
        let item = OutputItem {
            kind: "message".into(),
            name: None,
            call_id: None,
        };
        assert_eq!(item.as_function_call(), None);
    }
}
