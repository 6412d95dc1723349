use crate::input::{EncoderSettings, InputEvent, Touch, TouchPhase};
use bytes::Bytes;
use pxstream_core::protocol::TouchPoint;
use pxstream_core::{MessageCatalog, ProtocolError, ToPeerMessage};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;

/// Map a normalized coordinate in [0, 1] onto the full u16 range.
pub fn quantize_unsigned(value: f64) -> u16 {
    (value.clamp(0.0, 1.0) * 65535.0).round() as u16
}

/// Map a normalized delta in [-1, 1] onto the symmetric i16 range.
pub fn quantize_signed(value: f64) -> i16 {
    (value.clamp(-1.0, 1.0) * 32767.0).round() as i16
}

fn in_unit_range(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

fn touch_point(touch: &Touch) -> TouchPoint {
    TouchPoint {
        x: quantize_unsigned(touch.x),
        y: quantize_unsigned(touch.y),
        id: touch.id,
        force: (touch.force.clamp(0.0, 1.0) * 255.0).round() as u8,
        // fingers outside the video area are still reported, flagged invalid
        valid: in_unit_range(touch.x) && in_unit_range(touch.y),
    }
}

pub fn encode_descriptor(descriptor: &Value) -> Result<String, ProtocolError> {
    serde_json::to_string(descriptor).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

/// Highest quantization parameter the streamer's encoder accepts.
pub const MAX_ENCODER_QP: u8 = 51;

/// Console command that toggles the frame rate overlay.
pub const SHOW_FPS_COMMAND: &str = "stat fps";

pub fn encoder_settings_command(settings: EncoderSettings) -> Result<ToPeerMessage, ProtocolError> {
    let EncoderSettings { min_qp, max_qp } = settings;
    if min_qp > max_qp || max_qp > MAX_ENCODER_QP {
        return Err(ProtocolError::Malformed(format!(
            "encoder QP range {min_qp}..={max_qp} outside 0..={MAX_ENCODER_QP}"
        )));
    }
    let descriptor = json!({ "Encoder.MinQP": min_qp, "Encoder.MaxQP": max_qp });
    Ok(ToPeerMessage::Command {
        descriptor: encode_descriptor(&descriptor)?,
    })
}

pub fn console_command(command: &str) -> Result<ToPeerMessage, ProtocolError> {
    Ok(ToPeerMessage::Command {
        descriptor: encode_descriptor(&json!({ "ConsoleCommand": command }))?,
    })
}

#[derive(Serialize)]
struct LatencyProbe {
    #[serde(rename = "StartTime")]
    start_time: u64,
}

/// Build a latency probe stamped with `start_ms` on the session clock.
pub fn latency_probe(start_ms: u64) -> Result<ToPeerMessage, ProtocolError> {
    let probe = serde_json::to_string(&LatencyProbe { start_time: start_ms })
        .map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    Ok(ToPeerMessage::LatencyTest { probe })
}

/// Timings reported back by the peer for a latency probe.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LatencyProbeResult {
    /// Measured locally from probe send to report arrival.
    #[serde(skip)]
    pub round_trip: Duration,
    #[serde(default)]
    pub receipt_time_ms: Option<f64>,
    #[serde(default)]
    pub pre_capture_time_ms: Option<f64>,
    #[serde(default)]
    pub post_capture_time_ms: Option<f64>,
    #[serde(default)]
    pub pre_encode_time_ms: Option<f64>,
    #[serde(default)]
    pub post_encode_time_ms: Option<f64>,
    #[serde(default)]
    pub encode_ms: Option<f64>,
    #[serde(default)]
    pub capture_to_send_ms: Option<f64>,
    #[serde(default)]
    pub transmission_time_ms: Option<f64>,
}

pub fn parse_latency_report(report: &str, round_trip: Duration) -> Result<LatencyProbeResult, ProtocolError> {
    let mut result: LatencyProbeResult =
        serde_json::from_str(report).map_err(|e| ProtocolError::Malformed(format!("latency report: {e}")))?;
    result.round_trip = round_trip;
    Ok(result)
}

impl InputEvent {
    /// Translate into the catalog message that carries it.
    pub fn into_message(self) -> Result<ToPeerMessage, ProtocolError> {
        Ok(match self {
            InputEvent::KeyDown { key_code, repeat } => ToPeerMessage::KeyDown {
                key_code,
                is_repeat: repeat,
            },
            InputEvent::KeyUp { key_code } => ToPeerMessage::KeyUp { key_code },
            InputEvent::KeyPress { char_code } => ToPeerMessage::KeyPress { char_code },

            InputEvent::MouseEnter => ToPeerMessage::MouseEnter,
            InputEvent::MouseLeave => ToPeerMessage::MouseLeave,
            InputEvent::MouseDown { button, x, y } => ToPeerMessage::MouseDown {
                button: button.code(),
                x: quantize_unsigned(x),
                y: quantize_unsigned(y),
            },
            InputEvent::MouseUp { button, x, y } => ToPeerMessage::MouseUp {
                button: button.code(),
                x: quantize_unsigned(x),
                y: quantize_unsigned(y),
            },
            InputEvent::MouseDouble { button, x, y } => ToPeerMessage::MouseDouble {
                button: button.code(),
                x: quantize_unsigned(x),
                y: quantize_unsigned(y),
            },
            InputEvent::MouseMove { x, y, dx, dy } => ToPeerMessage::MouseMove {
                x: quantize_unsigned(x),
                y: quantize_unsigned(y),
                dx: quantize_signed(dx),
                dy: quantize_signed(dy),
            },
            InputEvent::MouseWheel { delta, x, y } => ToPeerMessage::MouseWheel {
                delta,
                x: quantize_unsigned(x),
                y: quantize_unsigned(y),
            },

            InputEvent::Touch { phase, touches } => {
                if touches.len() > u8::MAX as usize {
                    return Err(ProtocolError::LayoutMismatch(format!(
                        "{} touches exceed the list limit",
                        touches.len()
                    )));
                }
                let touches = touches.iter().map(touch_point).collect();
                match phase {
                    TouchPhase::Start => ToPeerMessage::TouchStart { touches },
                    TouchPhase::Move => ToPeerMessage::TouchMove { touches },
                    TouchPhase::End => ToPeerMessage::TouchEnd { touches },
                }
            }

            InputEvent::GamepadConnected => ToPeerMessage::GamepadConnected,
            InputEvent::GamepadDisconnected { controller } => {
                ToPeerMessage::GamepadDisconnected { controller }
            }
            InputEvent::GamepadButton {
                controller,
                button,
                pressed: true,
                repeat,
            } => ToPeerMessage::GamepadButtonPressed {
                controller,
                button,
                is_repeat: repeat,
            },
            InputEvent::GamepadButton {
                controller, button, ..
            } => ToPeerMessage::GamepadButtonReleased { controller, button },
            InputEvent::GamepadAnalog {
                controller,
                axis,
                value,
            } => ToPeerMessage::GamepadAnalog {
                controller,
                axis,
                value,
            },

            InputEvent::UiInteraction(descriptor) => ToPeerMessage::UiInteraction {
                descriptor: encode_descriptor(&descriptor)?,
            },
            InputEvent::Command(descriptor) => ToPeerMessage::Command {
                descriptor: encode_descriptor(&descriptor)?,
            },

            InputEvent::RequestKeyFrame => ToPeerMessage::KeyFrameRequest,
            InputEvent::RequestInitialSettings => ToPeerMessage::RequestInitialSettings,
            InputEvent::StartStreaming => ToPeerMessage::StartStreaming,
            InputEvent::StopStreaming => ToPeerMessage::StopStreaming,
            InputEvent::SetMaxFps(fps) => ToPeerMessage::FpsRequest { fps },
            InputEvent::SetMaxBitrate { kbps } => ToPeerMessage::BitrateRequest {
                max_bitrate_kbps: kbps,
            },
            InputEvent::EncoderSettings(settings) => encoder_settings_command(settings)?,
            InputEvent::ShowFps => console_command(SHOW_FPS_COMMAND)?,

            InputEvent::Raw(message) => message,
        })
    }

    /// Encode straight to a wire frame.
    pub fn encode(self, catalog: &MessageCatalog) -> Result<Bytes, ProtocolError> {
        self.into_message()?.encode(catalog)
    }
}
