use super::ScriptKeeper;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::router::{MsgHandler, MsgRouter};
use crate::storage::{ParamsStore, ScriptStore};
use crate::types::{
    AnyMsg, EventCreateNewScript, EventUpdateScript, MsgCreateNewScript, MsgCreateNewScriptResponse,
    MsgExec, MsgUpdateParams, MsgUpdateParamsResponse, MsgUpdateScript, MsgUpdateScriptResponse,
    Script, TypeUrl, ADDRESS_LEN,
};
use std::sync::Arc;
use tracing::{error, info};

pub(super) fn register(keeper: &Arc<ScriptKeeper>, router: &mut MsgRouter) {
    for type_url in [
        MsgExec::TYPE_URL,
        MsgUpdateScript::TYPE_URL,
        MsgCreateNewScript::TYPE_URL,
        MsgUpdateParams::TYPE_URL,
    ] {
        router.register(type_url, keeper.clone());
    }
}

impl ScriptKeeper {
    /// Replaces the code at `msg.address`, creating the script if needed.
    pub fn update_script(&self, ctx: &mut Context<'_>, msg: &MsgUpdateScript) -> Result<MsgUpdateScriptResponse> {
        let address = ctx.address_codec().normalize(&msg.address)?;

        let mut script = if ctx.store().has_script(&address) {
            ctx.store().get_script(&address)?
        } else {
            Script::empty(address.clone())
        };

        script.version += 1;
        script.code = match self.runtime().format(&msg.code) {
            Ok(formatted) => formatted,
            Err(e) => {
                error!(address = %address, error = %e, "failed to format code, storing it as written");
                msg.code.clone()
            }
        };
        ctx.store_mut().set_script(&address, &script)?;

        info!(address = %address, version = script.version, "updated script");
        ctx.emit_typed(&EventUpdateScript {
            address,
            version: script.version,
        })?;
        Ok(MsgUpdateScriptResponse {
            version: script.version,
        })
    }

    /// Stores code under an address derived from the creator and the code.
    pub fn create_new_script(
        &self,
        ctx: &mut Context<'_>,
        msg: &MsgCreateNewScript,
    ) -> Result<MsgCreateNewScriptResponse> {
        let codec = ctx.address_codec();
        let creator = codec.decode(&msg.creator_address)?;

        let mut hasher = blake3::Hasher::new();
        hasher.update(&creator);
        hasher.update(msg.code.as_bytes());
        let hash = hasher.finalize();
        let script_address = codec.encode(&hash.as_bytes()[..ADDRESS_LEN]);

        if ctx.store().has_script(&script_address) {
            return Err(Error::InvalidRequest(format!(
                "script with address {} already exists",
                script_address
            )));
        }

        let script = Script {
            address: script_address.clone(),
            version: 1,
            code: msg.code.clone(),
        };
        ctx.store_mut().set_script(&script_address, &script)?;

        info!(script = %script_address, creator = %msg.creator_address, "created script");
        ctx.emit_typed(&EventCreateNewScript {
            script_address: script_address.clone(),
            creator_address: msg.creator_address.clone(),
            version: script.version,
        })?;
        Ok(MsgCreateNewScriptResponse {
            script_address,
            version: script.version,
        })
    }

    pub fn update_params(&self, ctx: &mut Context<'_>, msg: &MsgUpdateParams) -> Result<MsgUpdateParamsResponse> {
        if msg.authority != self.authority {
            return Err(Error::Unauthorized(format!(
                "invalid authority; expected {}, got {}",
                self.authority, msg.authority
            )));
        }
        ctx.store_mut().set_params(&msg.params)?;
        info!(
            max_relative_historical_blocks = msg.params.max_relative_historical_blocks,
            absolute_historical_block_cutoff = msg.params.absolute_historical_block_cutoff,
            "updated script params"
        );
        Ok(MsgUpdateParamsResponse {})
    }
}

impl MsgHandler for ScriptKeeper {
    fn validate_basic(&self, ctx: &Context<'_>, msg: &AnyMsg) -> Result<()> {
        let codec = ctx.address_codec();
        match msg.type_url.as_str() {
            MsgExec::TYPE_URL => {
                let m: MsgExec = msg.unpack()?;
                codec.validate(&m.executor_address)?;
                if m.script_address.is_empty() {
                    return Err(Error::InvalidAddress("script address cannot be empty".into()));
                }
                Ok(())
            }
            MsgUpdateScript::TYPE_URL => codec.validate(&msg.unpack::<MsgUpdateScript>()?.address),
            MsgCreateNewScript::TYPE_URL => {
                codec.validate(&msg.unpack::<MsgCreateNewScript>()?.creator_address)
            }
            MsgUpdateParams::TYPE_URL => {
                let m: MsgUpdateParams = msg.unpack()?;
                codec.validate(&m.authority)?;
                m.params.validate()
            }
            other => Err(Error::NoHandler(format!("message {}", other))),
        }
    }

    fn signers(&self, msg: &AnyMsg) -> Result<Vec<String>> {
        let signer = match msg.type_url.as_str() {
            MsgExec::TYPE_URL => msg.unpack::<MsgExec>()?.executor_address,
            MsgUpdateScript::TYPE_URL => msg.unpack::<MsgUpdateScript>()?.address,
            MsgCreateNewScript::TYPE_URL => msg.unpack::<MsgCreateNewScript>()?.creator_address,
            MsgUpdateParams::TYPE_URL => msg.unpack::<MsgUpdateParams>()?.authority,
            other => return Err(Error::NoHandler(format!("message {}", other))),
        };
        Ok(vec![signer])
    }

    fn handle(&self, ctx: &mut Context<'_>, msg: &AnyMsg) -> Result<Option<AnyMsg>> {
        let response = match msg.type_url.as_str() {
            MsgExec::TYPE_URL => AnyMsg::pack(&self.exec_script(ctx, &msg.unpack()?)?)?,
            MsgUpdateScript::TYPE_URL => AnyMsg::pack(&self.update_script(ctx, &msg.unpack()?)?)?,
            MsgCreateNewScript::TYPE_URL => {
                AnyMsg::pack(&self.create_new_script(ctx, &msg.unpack()?)?)?
            }
            MsgUpdateParams::TYPE_URL => AnyMsg::pack(&self.update_params(ctx, &msg.unpack()?)?)?,
            other => return Err(Error::NoHandler(format!("message {}", other))),
        };
        Ok(Some(response))
    }
}
