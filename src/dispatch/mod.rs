use crate::context::Context;
use crate::error::{Error, Result, ResultExt};
use crate::types::{AnyMsg, MsgResponse};
use tracing::debug;

/// Validates, authorizes and routes one message on behalf of `executor`.
///
/// The message must declare exactly one signer and it must be `executor`.
/// Events the handler emits are re-emitted into `ctx` on success.
pub fn dispatch_message(ctx: &mut Context<'_>, executor: &str, msg: &AnyMsg) -> Result<MsgResponse> {
    let handler = ctx.services().msg_router.route(&msg.type_url)?;
    handler
        .validate_basic(ctx, msg)
        .with_context(|| format!("invalid message {}", msg.type_url))?;

    let signers = handler.signers(msg)?;
    if signers.len() != 1 {
        return Err(Error::Unauthorized(format!(
            "incorrect number of signers: expected 1, got {}",
            signers.len()
        )));
    }
    if !ctx.address_codec().same(&signers[0], executor)? {
        return Err(Error::Unauthorized(format!(
            "signer {} is not the executor {}",
            signers[0], executor
        )));
    }

    debug!(type_url = %msg.type_url, executor, depth = ctx.depth(), "dispatching message");
    let (result, events) = ctx.with_fresh_events(|c| handler.handle(c, msg));
    let response = result?;
    ctx.emit_all(events);
    Ok(response)
}

/// JSON-in/JSON-out form used by the script bridge. A handler without a
/// response yields `null`.
pub fn dispatch_json_message(ctx: &mut Context<'_>, executor: &str, json_msg: &str) -> Result<String> {
    let msg = AnyMsg::from_json(json_msg).context("failed to decode message")?;
    let response = dispatch_message(ctx, executor, &msg)?;
    Ok(serde_json::to_string(&response)?)
}

/// Dispatches `msgs` in order, stopping at the first failure.
pub fn dispatch_all(ctx: &mut Context<'_>, executor: &str, msgs: &[AnyMsg]) -> Result<Vec<MsgResponse>> {
    msgs.iter()
        .enumerate()
        .map(|(i, msg)| {
            dispatch_message(ctx, executor, msg)
                .with_context(|| format!("attached message {} ({})", i, msg.type_url))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{EventManager, Services};
    use crate::gas::GasMeter;
    use crate::history::NoHistory;
    use crate::router::MsgHandler;
    use crate::storage::{KVStore, MemoryStore};
    use crate::types::{AddressCodec, BlockHeader, Event};
    use serde_json::json;
    use std::sync::Arc;

    struct SetHandler;

    impl MsgHandler for SetHandler {
        fn validate_basic(&self, _ctx: &Context<'_>, msg: &AnyMsg) -> Result<()> {
            match msg.fields.get("key").and_then(|k| k.as_str()) {
                Some(k) if !k.is_empty() => Ok(()),
                _ => Err(Error::Invalid("key cannot be empty".into())),
            }
        }

        fn signers(&self, msg: &AnyMsg) -> Result<Vec<String>> {
            Ok(msg.fields["signers"]
                .as_array()
                .map(|a| a.iter().filter_map(|s| s.as_str().map(String::from)).collect())
                .unwrap_or_default())
        }

        fn handle(&self, ctx: &mut Context<'_>, msg: &AnyMsg) -> Result<Option<AnyMsg>> {
            let key = msg.fields["key"].as_str().unwrap_or_default();
            ctx.store_mut().set(key.as_bytes().to_vec(), b"1".to_vec());
            ctx.emit(Event::new("set").with_attribute("key", key));
            Ok(None)
        }
    }

    fn set_msg(signers: &[&str], key: &str) -> AnyMsg {
        let value = json!({"@type": "/test.MsgSet", "signers": signers, "key": key});
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_dispatch_authorization() {
        let codec = AddressCodec::default();
        let alice = codec.encode(&[1u8; 20]);
        let bob = codec.encode(&[2u8; 20]);

        let mut services = Services::new(Box::new(NoHistory), codec);
        services.msg_router.register("/test.MsgSet", Arc::new(SetHandler));
        let header = BlockHeader::new(1, "test");
        let mut store = MemoryStore::new();
        let mut gas = GasMeter::infinite();
        let mut events = EventManager::new();
        let mut ctx = Context::new(&mut store, &mut gas, &mut events, &header, &services);

        let err = dispatch_message(&mut ctx, &alice, &set_msg(&[&bob], "a")).unwrap_err();
        assert!(err.is_unauthorized());
        let err = dispatch_message(&mut ctx, &alice, &set_msg(&[&alice, &bob], "a")).unwrap_err();
        assert!(err.is_unauthorized());
        assert!(dispatch_message(&mut ctx, &alice, &set_msg(&[&alice], "")).is_err());
        assert!(!ctx.store().has(b"a"));

        let response = dispatch_message(&mut ctx, &alice, &set_msg(&[&alice], "a")).unwrap();
        assert_eq!(response, None);
        assert!(ctx.store().has(b"a"));
        assert_eq!(ctx.events().events()[0].attribute("key"), Some("a"));

        let json = dispatch_json_message(&mut ctx, &alice, &set_msg(&[&alice], "b").to_json().unwrap()).unwrap();
        assert_eq!(json, "null");
        assert!(dispatch_json_message(&mut ctx, &alice, r#"{"@type":"/test.Unknown"}"#).is_err());
    }
}
