use shopmate_core::config::OrchestratorConfig;
use shopmate_core::{FunctionCall, FunctionName};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    RequireAuthentication {
        function_name: FunctionName,
        reason_code: &'static str,
        user_message: String,
    },
}

/// Which functions may only run for an authenticated user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardrailPolicy {
    pub privileged_functions: Vec<FunctionName>,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self { privileged_functions: vec![FunctionName::PlaceOrder] }
    }
}

impl GuardrailPolicy {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self { privileged_functions: config.privileged_functions.clone() }
    }

    /// Unknown names are never privileged; the router rejects them instead.
    pub fn privileged_name(&self, call: &FunctionCall) -> Option<FunctionName> {
        let name = call.name.parse::<FunctionName>().ok()?;
        self.privileged_functions.contains(&name).then_some(name)
    }

    pub fn evaluate(&self, call: &FunctionCall, authenticated: bool) -> GuardrailDecision {
        match self.privileged_name(call) {
            Some(function_name) if !authenticated => GuardrailDecision::RequireAuthentication {
                function_name,
                reason_code: "authentication_required",
                user_message: format!("Please sign in so I can {}.", describe(function_name)),
            },
            _ => GuardrailDecision::Allow,
        }
    }
}

fn describe(name: FunctionName) -> &'static str {
    match name {
        FunctionName::PlaceOrder => "place your order",
        FunctionName::DeleteCart => "clear that cart",
        _ => "continue",
    }
}
