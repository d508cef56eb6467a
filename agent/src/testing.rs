//! In-memory stand-ins for the radio, host networking, streams and control transport.

use alloc::sync::Arc;
use core::{net::Ipv4Addr, time::Duration};
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use linkshift_common::{Envelope, MacAddr};
use tokio::{
    sync::mpsc,
    time::{Instant, sleep},
};

use crate::{
    app::RadioLock,
    commands::ToolError,
    control::{Connector, ControlError, Session},
    net::{HostRoute, NetControl, NetError},
    radio::{Radio, RadioStatus, ScanEntry},
    stream::StreamControl,
};

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn rejected(what: &str) -> ToolError {
    ToolError::Rejected {
        program: "fake".to_string(),
        reply: format!("FAIL {what}"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    Status,
    Scan,
    ScanResults,
    Roam(MacAddr),
    Lock(MacAddr),
}

#[derive(Debug, Default)]
struct RadioState {
    associated: Option<MacAddr>,
    /// Association a roam will switch to once `polls_until_associated` status calls passed.
    pending: Option<MacAddr>,
    polls_until_associated: u32,
    ignore_roam: bool,
    fail_roam: bool,
    fail_lock: bool,
    fail_scan: bool,
    table: Vec<ScanEntry>,
    calls: Vec<RadioCall>,
    unguarded: Vec<RadioCall>,
}

/// Scripted radio. Roams succeed and take effect on the next status poll unless told
/// otherwise.
#[derive(Debug, Default)]
pub struct FakeRadio {
    state: Mutex<RadioState>,
    guard: Option<Arc<RadioLock>>,
}

impl FakeRadio {
    /// Records every call made while `lock` is free.
    pub fn guarded_by(lock: Arc<RadioLock>) -> Self {
        Self {
            guard: Some(lock),
            ..Self::default()
        }
    }

    pub fn associate(&self, bssid: Option<MacAddr>) {
        locked(&self.state).associated = bssid;
    }

    pub fn confirm_after(&self, polls: u32) {
        locked(&self.state).polls_until_associated = polls;
    }

    pub fn ignore_roams(&self) {
        locked(&self.state).ignore_roam = true;
    }

    pub fn fail_roams(&self) {
        locked(&self.state).fail_roam = true;
    }

    pub fn fail_locks(&self) {
        locked(&self.state).fail_lock = true;
    }

    pub fn fail_scans(&self, fail: bool) {
        locked(&self.state).fail_scan = fail;
    }

    pub fn set_table(&self, table: Vec<ScanEntry>) {
        locked(&self.state).table = table;
    }

    pub fn calls(&self) -> Vec<RadioCall> {
        locked(&self.state).calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&RadioCall) -> bool) -> usize {
        locked(&self.state).calls.iter().filter(|c| pred(c)).count()
    }

    pub fn unguarded(&self) -> Vec<RadioCall> {
        locked(&self.state).unguarded.clone()
    }

    fn record(&self, call: RadioCall) -> MutexGuard<'_, RadioState> {
        let mut state = locked(&self.state);
        let held = self.guard.as_ref().is_none_or(|lock| lock.try_lock().is_err());
        if !held {
            state.unguarded.push(call.clone());
        }
        state.calls.push(call);
        state
    }
}

impl Radio for FakeRadio {
    async fn status(&self) -> Result<RadioStatus, ToolError> {
        let mut state = self.record(RadioCall::Status);
        if state.pending.is_some() {
            if state.polls_until_associated == 0 {
                state.associated = state.pending.take();
            } else {
                state.polls_until_associated -= 1;
            }
        }
        Ok(RadioStatus {
            bssid: state.associated,
            ssid: state.associated.map(|_| "HSLSV".to_string()),
            wpa_state: Some("COMPLETED".to_string()),
        })
    }

    async fn scan(&self) -> Result<(), ToolError> {
        let state = self.record(RadioCall::Scan);
        if state.fail_scan {
            return Err(rejected("BUSY"));
        }
        Ok(())
    }

    async fn scan_results(&self) -> Result<Vec<ScanEntry>, ToolError> {
        let state = self.record(RadioCall::ScanResults);
        Ok(state.table.clone())
    }

    async fn roam(&self, target: MacAddr) -> Result<(), ToolError> {
        let mut state = self.record(RadioCall::Roam(target));
        if state.fail_roam {
            return Err(rejected("roam"));
        }
        if !state.ignore_roam {
            state.pending = Some(target);
        }
        Ok(())
    }

    async fn lock(&self, target: MacAddr) -> Result<(), ToolError> {
        if self.record(RadioCall::Lock(target)).fail_lock {
            return Err(rejected("lock"));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct NetState {
    addresses: HashMap<String, Ipv4Addr>,
    gateways: HashMap<String, Ipv4Addr>,
    routes: Vec<HostRoute>,
    fail_routes: bool,
}

#[derive(Debug, Default)]
pub struct FakeNet {
    state: Mutex<NetState>,
}

impl FakeNet {
    pub fn set_address(&self, interface: &str, ip: Option<Ipv4Addr>) {
        let mut state = locked(&self.state);
        match ip {
            Some(ip) => state.addresses.insert(interface.to_string(), ip),
            None => state.addresses.remove(interface),
        };
    }

    pub fn set_gateway(&self, interface: &str, gateway: Option<Ipv4Addr>) {
        let mut state = locked(&self.state);
        match gateway {
            Some(gw) => state.gateways.insert(interface.to_string(), gw),
            None => state.gateways.remove(interface),
        };
    }

    pub fn fail_routes(&self, fail: bool) {
        locked(&self.state).fail_routes = fail;
    }

    pub fn routes(&self) -> Vec<HostRoute> {
        locked(&self.state).routes.clone()
    }
}

impl NetControl for FakeNet {
    async fn interface_ipv4(&self, interface: &str) -> Result<Option<Ipv4Addr>, NetError> {
        Ok(locked(&self.state).addresses.get(interface).copied())
    }

    async fn default_gateway(&self, interface: &str) -> Result<Option<Ipv4Addr>, NetError> {
        Ok(locked(&self.state).gateways.get(interface).copied())
    }

    async fn route_replace(&self, route: &HostRoute) -> Result<(), NetError> {
        let mut state = locked(&self.state);
        if state.fail_routes {
            return Err(rejected("route").into());
        }
        state.routes.push(route.clone());
        Ok(())
    }

    async fn route_get(&self, destination: Ipv4Addr) -> Result<String, NetError> {
        Ok(locked(&self.state)
            .routes
            .iter()
            .rev()
            .find(|r| r.destination == destination)
            .map(|r| format!("{} dev {}", r.destination, r.interface))
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamCall {
    Media(String, Option<Ipv4Addr>),
    Load(String),
}

#[derive(Debug, Default)]
pub struct FakeStreams {
    calls: Mutex<Vec<StreamCall>>,
}

impl FakeStreams {
    pub fn calls(&self) -> Vec<StreamCall> {
        locked(&self.calls).clone()
    }
}

impl StreamControl for FakeStreams {
    async fn start_media(&self, interface: &str, bind_ip: Option<Ipv4Addr>) {
        locked(&self.calls).push(StreamCall::Media(interface.to_string(), bind_ip));
    }

    async fn retarget_load(&self, interface: &str) {
        locked(&self.calls).push(StreamCall::Load(interface.to_string()));
    }
}

/// Server side of a [`FakeConnector`] session.
#[derive(Debug)]
pub struct ServerEnd {
    /// Events the agent sent.
    pub from_agent: mpsc::Receiver<Envelope>,
    /// Events to deliver to the agent; dropping it ends the session.
    pub to_agent: mpsc::Sender<Envelope>,
}

#[derive(Debug, Default)]
struct ConnectorState {
    failures_left: u32,
    delay: Duration,
    attempts: Vec<Instant>,
    ends: Vec<ServerEnd>,
}

/// Connector that fails a scripted number of times, then hands out in-memory sessions.
#[derive(Debug, Default)]
pub struct FakeConnector {
    state: Mutex<ConnectorState>,
}

impl FakeConnector {
    pub fn failing(times: u32) -> Self {
        let connector = Self::default();
        connector.fail_next(times);
        connector
    }

    pub fn fail_next(&self, times: u32) {
        locked(&self.state).failures_left = times;
    }

    /// Makes every attempt take `delay` before it resolves.
    pub fn slow(&self, delay: Duration) {
        locked(&self.state).delay = delay;
    }

    pub fn attempts(&self) -> Vec<Instant> {
        locked(&self.state).attempts.clone()
    }

    /// Takes the server end of the most recent session.
    pub fn take_server(&self) -> Option<ServerEnd> {
        locked(&self.state).ends.pop()
    }
}

impl Connector for FakeConnector {
    async fn connect(&self) -> Result<Session, ControlError> {
        let delay = {
            let mut state = locked(&self.state);
            state.attempts.push(Instant::now());
            state.delay
        };
        if !delay.is_zero() {
            sleep(delay).await;
        }
        let mut state = locked(&self.state);
        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(ControlError::Closed);
        }
        let (out_tx, out_rx) = mpsc::channel(64);
        let (in_tx, in_rx) = mpsc::channel(64);
        state.ends.push(ServerEnd {
            from_agent: out_rx,
            to_agent: in_tx,
        });
        Ok(Session {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}
