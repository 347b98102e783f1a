// src/server.rs
//
// JSON-over-HTTP façade for one environment.
//
// Routes live under `/<env-id>/`, e.g. `/op2-xh035-geom-v0/step`. Request
// handling is a plain function of (method, url, body) so it can be tested
// without sockets; `serve` only moves bytes between tiny_http and
// `handle`.
//
// Status codes: malformed JSON or wrong shapes -> 400, unknown route or
// environment -> 404, wrong method -> 405, simulator failures -> 500.

use std::collections::BTreeMap;
use std::error::Error;
use std::io::Read;

use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tiny_http::{Header, Response, Server};

use crate::config::EnvVariant;
use crate::constraints::ParamMap;
use crate::error::CircusError;
use crate::rl::{CircusEnv, GoalObservation, ResetTarget, StepOutcome};
use crate::sim::CircuitSession;

/// Status and JSON body of a handled request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    fn ok(value: JsonValue) -> Self {
        Self {
            status: 200,
            body: value.to_string(),
        }
    }

    fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": message.into() }).to_string(),
        }
    }

    pub fn json(&self) -> Option<JsonValue> {
        serde_json::from_str(&self.body).ok()
    }
}

impl From<CircusError> for HttpReply {
    fn from(e: CircusError) -> Self {
        HttpReply::error(e.http_status(), e.to_string())
    }
}

#[derive(Debug, Default, Deserialize)]
struct ResetBody {
    #[serde(default)]
    env_mask: Option<Vec<bool>>,
    #[serde(default)]
    env_ids: Option<Vec<usize>>,
}

#[derive(Debug, Deserialize)]
struct StepBody {
    action: Vec<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
struct RestoreBody {
    sizing: BTreeMap<usize, ParamMap>,
}

fn parse_body<T: for<'de> Deserialize<'de>>(body: &str) -> Result<T, HttpReply> {
    serde_json::from_str(body).map_err(|e| HttpReply::error(400, format!("malformed request body: {}", e)))
}

fn to_json<T: serde::Serialize>(value: &T) -> HttpReply {
    match serde_json::to_value(value) {
        Ok(v) => HttpReply::ok(v),
        Err(e) => HttpReply::error(500, e.to_string()),
    }
}

/// Serves one environment.
#[derive(Debug)]
pub struct EnvServer<S> {
    env: CircusEnv<S>,
    prefix: String,
}

const MUTATING_ROUTES: [&str; 7] = [
    "reset",
    "step",
    "random_step",
    "random_action",
    "restore",
    "restore_last",
    "reward",
];
const READ_ROUTES: [&str; 11] = [
    "num_envs",
    "num_steps",
    "action_space",
    "observation_space",
    "action_keys",
    "observation_keys",
    "goal_keys",
    "current_performance",
    "current_goal",
    "current_sizing",
    "last_action",
];

impl<S: CircuitSession> EnvServer<S> {
    pub fn new(env: CircusEnv<S>) -> Self {
        let prefix = format!("/{}", env.id());
        Self { env, prefix }
    }

    /// URL prefix, e.g. `/op2-xh035-geom-v0`.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn env(&self) -> &CircusEnv<S> {
        &self.env
    }

    pub fn into_env(self) -> CircusEnv<S> {
        self.env
    }

    fn observation_json(&self, obs: GoalObservation) -> HttpReply {
        match self.env.id().variant {
            EnvVariant::Goal => to_json(&obs),
            EnvVariant::NonGoal => to_json(&obs.observation),
        }
    }

    fn step_json(&self, out: StepOutcome) -> HttpReply {
        let observation = match self.env.id().variant {
            EnvVariant::Goal => serde_json::to_value(&out.observation),
            EnvVariant::NonGoal => serde_json::to_value(&out.observation.observation),
        };
        match (observation, serde_json::to_value(&out.info)) {
            (Ok(observation), Ok(info)) => HttpReply::ok(json!({
                "observation": observation,
                "reward": out.reward,
                "done": out.done,
                "info": info,
            })),
            (Err(e), _) | (_, Err(e)) => HttpReply::error(500, e.to_string()),
        }
    }

    pub fn handle(&mut self, method: &str, url: &str, body: &str) -> HttpReply {
        let path = url.split('?').next().unwrap_or(url);
        let Some(route) = path
            .strip_prefix(self.prefix.as_str())
            .and_then(|r| r.strip_prefix('/'))
        else {
            return HttpReply::error(404, format!("unknown environment path '{}'", path));
        };
        let route = route.trim_end_matches('/');

        let mutating = MUTATING_ROUTES.contains(&route);
        if !mutating && !READ_ROUTES.contains(&route) {
            return HttpReply::error(404, format!("unknown route '{}'", route));
        }
        let expected = if mutating { "POST" } else { "GET" };
        if !method.eq_ignore_ascii_case(expected) {
            return HttpReply::error(405, format!("{} not allowed on '{}'", method, route));
        }
        self.dispatch(route, body)
    }

    fn dispatch(&mut self, route: &str, body: &str) -> HttpReply {
        match route {
            "num_envs" => HttpReply::ok(json!({ "num_envs": self.env.num_envs() })),
            "num_steps" => HttpReply::ok(json!({ "num_steps": self.env.num_steps() })),
            "action_space" => to_json(self.env.action_space()),
            "observation_space" => to_json(self.env.observation_space()),
            "action_keys" => to_json(&self.env.action_keys()),
            "observation_keys" => to_json(&self.env.observation_keys()),
            "goal_keys" => to_json(&self.env.goal_keys()),
            "current_performance" => to_json(&self.env.current_performance()),
            "current_goal" => to_json(&self.env.current_goal()),
            "current_sizing" => to_json(&self.env.current_sizing()),
            "last_action" => to_json(&self.env.last_action()),
            "random_action" => HttpReply::ok(json!({ "action": self.env.sample_actions() })),
            "reset" => {
                let req: ResetBody = if body.trim().is_empty() {
                    ResetBody::default()
                } else {
                    match parse_body(body) {
                        Ok(r) => r,
                        Err(reply) => return reply,
                    }
                };
                let target = ResetTarget {
                    mask: req.env_mask,
                    ids: req.env_ids,
                };
                match self.env.reset(&target) {
                    Ok(obs) => self.observation_json(obs),
                    Err(e) => e.into(),
                }
            }
            "step" => {
                let req: StepBody = match parse_body(body) {
                    Ok(r) => r,
                    Err(reply) => return reply,
                };
                match self.env.step(&req.action) {
                    Ok(out) => self.step_json(out),
                    Err(e) => e.into(),
                }
            }
            "random_step" => {
                let actions = self.env.sample_actions();
                match self.env.step(&actions) {
                    Ok(out) => self.step_json(out),
                    Err(e) => e.into(),
                }
            }
            "reward" => {
                let obs: GoalObservation = match parse_body(body) {
                    Ok(r) => r,
                    Err(reply) => return reply,
                };
                match self.env.compute_reward(&obs) {
                    Ok(reward) => HttpReply::ok(json!({ "reward": reward })),
                    Err(e) => e.into(),
                }
            }
            "restore" => {
                let req: RestoreBody = match parse_body(body) {
                    Ok(r) => r,
                    Err(reply) => return reply,
                };
                match self.env.restore(&req.sizing) {
                    Ok(obs) => self.observation_json(obs),
                    Err(e) => e.into(),
                }
            }
            "restore_last" => match self.env.restore_last() {
                Ok(obs) => self.observation_json(obs),
                Err(e) => e.into(),
            },
            _ => HttpReply::error(404, format!("unknown route '{}'", route)),
        }
    }

    /// Blocking request loop on `addr` (`host:port`).
    pub fn serve(mut self, addr: &str) -> Result<(), Box<dyn Error + Send + Sync + 'static>> {
        let server = Server::http(addr)?;
        eprintln!("listening=http://{}{}/ | routes=num_envs,reset,step,...", addr, self.prefix);
        let content_type = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
            .map_err(|_| "invalid content-type header")?;
        for mut request in server.incoming_requests() {
            let mut body = String::new();
            let reply = match request.as_reader().read_to_string(&mut body) {
                Ok(_) => {
                    let method = request.method().as_str().to_string();
                    let url = request.url().to_string();
                    self.handle(&method, &url, &body)
                }
                Err(e) => HttpReply::error(400, format!("unreadable request body: {}", e)),
            };
            let response = Response::from_string(reply.body)
                .with_status_code(reply.status)
                .with_header(content_type.clone());
            let _ = request.respond(response);
        }
        self.env.close()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ActionMode, EnvConfig, EnvId};
    use crate::pdk::Pdk;
    use crate::sim::{SyntheticBackend, SyntheticSession};
    use crate::telemetry::{TelemetryConfig, TelemetrySink};
    use crate::topology::Topology;

    fn server(variant: EnvVariant) -> EnvServer<SyntheticSession> {
        let id = EnvId::new(Topology::Symmetrical, Pdk::Xh035, ActionMode::Geometric, variant);
        let cfg = EnvConfig::default().with_num_envs(2).with_num_steps(3);
        let env = CircusEnv::new(&SyntheticBackend::new(4), id, cfg)
            .unwrap()
            .with_telemetry(TelemetrySink::from_config(TelemetryConfig::off()));
        EnvServer::new(env)
    }

    #[test]
    fn test_introspection_routes() {
        let mut s = server(EnvVariant::Goal);
        assert_eq!(s.prefix(), "/op2-xh035-geom-v0");
        let r = s.handle("GET", "/op2-xh035-geom-v0/num_envs", "");
        assert_eq!(r.status, 200);
        assert_eq!(r.json().unwrap()["num_envs"], 2);
        let keys = s.handle("GET", "/op2-xh035-geom-v0/goal_keys", "").json().unwrap();
        assert_eq!(keys.as_array().unwrap().len(), 29);
        let space = s.handle("GET", "/op2-xh035-geom-v0/observation_space", "").json().unwrap();
        assert_eq!(space["type"], "dict");
    }

    #[test]
    fn test_reset_and_step() {
        let mut s = server(EnvVariant::Goal);
        let r = s.handle("POST", "/op2-xh035-geom-v0/reset", r#"{"env_ids": [1]}"#);
        assert_eq!(r.status, 200);
        assert_eq!(r.json().unwrap()["desired_goal"].as_array().unwrap().len(), 2);

        let d = s.env().action_space().dim();
        let body = json!({ "action": [vec![0.1; d], vec![-0.1; d]] }).to_string();
        let r = s.handle("POST", "/op2-xh035-geom-v0/step", &body);
        assert_eq!(r.status, 200);
        let v = r.json().unwrap();
        assert_eq!(v["reward"].as_array().unwrap().len(), 2);
        assert_eq!(v["info"][0]["steps"], 1);

        let r = s.handle("POST", "/op2-xh035-geom-v0/random_step", "");
        assert_eq!(r.status, 200);
        assert_eq!(s.env().steps(), &[2, 2]);
    }

    #[test]
    fn test_non_goal_observation_is_matrix() {
        let mut s = server(EnvVariant::NonGoal);
        let r = s.handle("POST", "/op2-xh035-geom-v1/reset", "");
        let v = r.json().unwrap();
        assert!(v.is_array());
        assert_eq!(v.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_error_statuses() {
        let mut s = server(EnvVariant::Goal);
        assert_eq!(s.handle("GET", "/op2-xh035-geom-v0/nope", "").status, 404);
        assert_eq!(s.handle("GET", "/op9-xh035-geom-v0/num_envs", "").status, 404);
        assert_eq!(s.handle("POST", "/op2-xh035-geom-v0/step", "{not json").status, 400);
        assert_eq!(
            s.handle("POST", "/op2-xh035-geom-v0/step", r#"{"action": [[0.0]]}"#).status,
            400
        );
        assert_eq!(s.handle("GET", "/op2-xh035-geom-v0/step", "").status, 405);
        assert_eq!(s.handle("POST", "/op2-xh035-geom-v0/reset", r#"{"env_ids": [9]}"#).status, 400);
    }

    #[test]
    fn test_reward_route_checks_goal_width() {
        let mut s = server(EnvVariant::Goal);
        let url = "/op2-xh035-geom-v0/reward";
        for body in [
            r#"{"observation": [[]], "achieved_goal": [[]], "desired_goal": [[]]}"#,
            r#"{"observation": [[]], "achieved_goal": [[-1.0]], "desired_goal": [[1.0]]}"#,
        ] {
            assert_eq!(s.handle("POST", url, body).status, 400, "{}", body);
        }

        let obs = s.env().current_observation().unwrap();
        let body = serde_json::to_string(&obs).unwrap();
        let r = s.handle("POST", url, &body);
        assert_eq!(r.status, 200);
        assert_eq!(r.json().unwrap()["reward"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_random_action_is_post_only() {
        let mut s = server(EnvVariant::Goal);
        assert_eq!(s.handle("GET", "/op2-xh035-geom-v0/random_action", "").status, 405);
        let r = s.handle("POST", "/op2-xh035-geom-v0/random_action", "");
        assert_eq!(r.status, 200);
        assert_eq!(r.json().unwrap()["action"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_restore_route() {
        let mut s = server(EnvVariant::Goal);
        let sizing = s.env().current_sizing()[0].clone();
        let body = json!({ "sizing": { "0": sizing } }).to_string();
        let r = s.handle("POST", "/op2-xh035-geom-v0/restore", &body);
        assert_eq!(r.status, 200);
        assert_eq!(s.handle("POST", "/op2-xh035-geom-v0/restore_last", "").status, 200);
    }
}
