//! Interpreting inbound control events.

use linkshift_common::{CommandPayload, Envelope, EventName, NumberOrString, RebootPayload};

/// Something the server asked this node to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Switch to access point `n`, or back to wired for `0`.
    Handover(u32),
    Reboot,
}

/// Why an inbound event did not produce a [`Directive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ignored {
    /// Addressed to another node.
    ForeignNode(String),
    /// No node identity in the payload.
    Unaddressed,
    Malformed(String),
    /// A command without a handover target.
    NoHandover,
    /// Session lifecycle notice.
    Lifecycle(EventName),
    /// An event this node does not act on.
    Unexpected(String),
}

/// Maps an inbound event to a directive for node `node_id`.
///
/// # Errors
///
/// Returns the reason the event is ignored.
pub fn interpret(envelope: &Envelope, node_id: u32) -> Result<Directive, Ignored> {
    match envelope.name() {
        Some(EventName::Command) => {
            let payload: CommandPayload = envelope
                .decode()
                .map_err(|e| Ignored::Malformed(e.to_string()))?;
            addressed_to(payload.robot_id.as_ref(), node_id)?;
            let handover = payload.handover.ok_or(Ignored::NoHandover)?;
            handover
                .as_index()
                .map(Directive::Handover)
                .ok_or_else(|| Ignored::Malformed(format!("handover target {}", handover.as_key())))
        }
        Some(EventName::Reboot) => {
            let payload: RebootPayload = envelope
                .decode()
                .map_err(|e| Ignored::Malformed(e.to_string()))?;
            addressed_to(payload.robot_id.as_ref(), node_id)?;
            Ok(Directive::Reboot)
        }
        Some(event @ (EventName::Connect | EventName::Disconnect)) => Err(Ignored::Lifecycle(event)),
        Some(EventName::Telemetry | EventName::Keepalive) | None => {
            Err(Ignored::Unexpected(envelope.event.clone()))
        }
    }
}

fn addressed_to(robot_id: Option<&NumberOrString>, node_id: u32) -> Result<(), Ignored> {
    let key = robot_id.ok_or(Ignored::Unaddressed)?.as_key();
    if key == node_id.to_string() {
        Ok(())
    } else {
        Err(Ignored::ForeignNode(key))
    }
}
