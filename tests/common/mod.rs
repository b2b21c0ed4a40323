#![allow(dead_code)]

use chrono::Utc;
use script_runtime::bridge::wire::{
    ConsumeGasRequest, EmitEventRequest, MsgRequest, QueryRequest, RpcRequest, RpcResponse,
};
use script_runtime::keeper::AddressResolver;
use script_runtime::types::{AnyMsg, MsgExec};
use script_runtime::{
    App, Error, Invocation, Result, RunningScript, RuntimeConfig, RuntimeOutput, Script, ScriptRuntime,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// HTTP client a fake script uses to call back into the host.
pub struct BridgeClient {
    url: String,
    http: reqwest::blocking::Client,
}

impl BridgeClient {
    pub fn new(port: u16) -> Self {
        let http = reqwest::blocking::Client::builder()
            .no_proxy()
            .build()
            .expect("http client");
        BridgeClient {
            url: format!("http://127.0.0.1:{}/rpc", port),
            http,
        }
    }

    pub fn call<P: Serialize>(&self, op: &str, params: &P) -> std::result::Result<Value, String> {
        let request = RpcRequest::new(op, params).expect("request");
        let response: RpcResponse = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .expect("bridge reachable")
            .json()
            .expect("json reply");
        match response.error {
            Some(error) => Err(error),
            None => Ok(response.result),
        }
    }

    pub fn msg(&self, msg: &AnyMsg, gas_limit: u64) -> std::result::Result<String, String> {
        let json_msg = msg.to_json().expect("msg json");
        self.call("Msg", &MsgRequest { json_msg, gas_limit })
            .map(|v| v.as_str().unwrap_or_default().to_string())
    }

    pub fn query(&self, query: &AnyMsg, query_height: i64) -> std::result::Result<AnyMsg, String> {
        let json_query = query.to_json().expect("query json");
        self.call("Query", &QueryRequest { json_query, query_height })
            .map(|v| AnyMsg::from_json(v.as_str().unwrap_or_default()).expect("query response"))
    }

    pub fn emit_event(&self, key: &str, value: &str) -> std::result::Result<Value, String> {
        self.call(
            "EmitEvent",
            &EmitEventRequest {
                key: key.to_string(),
                value: value.to_string(),
            },
        )
    }

    pub fn consume_gas(&self, amount: i64) -> std::result::Result<Value, String> {
        self.call("ConsumeGas", &ConsumeGasRequest { amount })
    }

    pub fn gas_limit(&self) -> std::result::Result<Value, String> {
        self.call("GasLimit", &Value::Null)
    }
}

/// What a fake script sees when it starts.
pub struct ScriptCall {
    pub invocation: Invocation,
    pub script: Script,
    /// Present in exec mode.
    pub msg: Option<MsgExec>,
    pub client: BridgeClient,
}

type Behaviour = Arc<dyn Fn(&ScriptCall) -> RuntimeOutput + Send + Sync>;

/// Runtime whose "interpreter" is a Rust closure per script address, run on
/// its own thread like a real child process.
#[derive(Clone, Default)]
pub struct FakeRuntime {
    scripts: Arc<Mutex<HashMap<String, Behaviour>>>,
    invocations: Arc<Mutex<Vec<Invocation>>>,
}

impl FakeRuntime {
    pub fn on<F>(&self, address: &str, behaviour: F)
    where
        F: Fn(&ScriptCall) -> RuntimeOutput + Send + Sync + 'static,
    {
        self.scripts
            .lock()
            .unwrap()
            .insert(address.to_string(), Arc::new(behaviour));
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }
}

struct FakeRunning(JoinHandle<RuntimeOutput>);

impl RunningScript for FakeRunning {
    fn wait(self: Box<Self>) -> Result<RuntimeOutput> {
        self.0
            .join()
            .map_err(|_| Error::Runtime("fake interpreter panicked".into()))
    }
}

impl ScriptRuntime for FakeRuntime {
    fn spawn(&self, invocation: &Invocation) -> Result<Box<dyn RunningScript>> {
        self.invocations.lock().unwrap().push(invocation.clone());

        let (script_json, msg) = match invocation {
            Invocation::Exec {
                script_json, msg_json, ..
            } => (script_json, Some(AnyMsg::from_json(msg_json)?.unpack::<MsgExec>()?)),
            Invocation::Web { script_json, .. } => (script_json, None),
        };
        let script: Script = AnyMsg::from_json(script_json)?.unpack()?;
        let behaviour = self.scripts.lock().unwrap().get(&script.address).cloned();

        let call = ScriptCall {
            invocation: invocation.clone(),
            script,
            msg,
            client: BridgeClient::new(invocation.port()),
        };
        let handle = thread::spawn(move || match behaviour {
            Some(behaviour) => behaviour(&call),
            None => ok("None"),
        });
        Ok(Box::new(FakeRunning(handle)))
    }
}

pub fn ok(stdout: &str) -> RuntimeOutput {
    RuntimeOutput {
        success: true,
        status: Some(0),
        stdout: stdout.to_string(),
        stderr: String::new(),
        combined: stdout.to_string(),
    }
}

/// Exit status 1 after a traceback on stderr and `stdout`.
pub fn failed(stdout: &str) -> RuntimeOutput {
    let stderr = "Traceback (most recent call last):\n";
    RuntimeOutput {
        success: false,
        status: Some(1),
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        combined: format!("{}{}", stderr, stdout),
    }
}

/// Exit status 1 with `stderr` written after `stdout`.
pub fn failed_on_stderr(stdout: &str, stderr: &str) -> RuntimeOutput {
    RuntimeOutput {
        success: false,
        status: Some(1),
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        combined: format!("{}{}", stdout, stderr),
    }
}

/// An app at height 1 backed by `runtime`.
pub fn app(runtime: &FakeRuntime) -> App {
    app_with(runtime, RuntimeConfig::default())
}

pub fn app_with(runtime: &FakeRuntime, config: RuntimeConfig) -> App {
    let mut app = App::new(config, Arc::new(runtime.clone()), Arc::new(AddressResolver)).unwrap();
    app.begin_block(1, Utc::now()).unwrap();
    app
}

pub fn address(app: &App, byte: u8) -> String {
    app.config().address_codec().encode(&[byte; 20])
}

pub fn exec(executor: &str, script: &str, function: &str) -> MsgExec {
    MsgExec {
        executor_address: executor.to_string(),
        script_address: script.to_string(),
        function_name: function.to_string(),
        ..MsgExec::default()
    }
}
