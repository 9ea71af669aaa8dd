// crates/host/src/agent/tool_defs.rs

//! Tool definitions for the agent.

use serde_json::json;

pub const REQUEST_FUNCTION: &str = "requestFunction";

/// The one tool that is always declared: asking for a new capability.
pub fn request_function_tool() -> serde_json::Value {
    json!({
        "type": "function",
        "function": {
            "name": REQUEST_FUNCTION,
            "description": "Requests a new function with given name and description",
            "parameters": {
                "type": "object",
                "properties": {
                    "name": {
                        "type": "string",
                        "description": "The name of the function, camelCase, no spaces. For example sendEmail."
                    },
                    "description": {
                        "type": "string",
                        "description": "A detailed description of what the function does, include input params, and return value. \
                            For example: 'Sends an email to the given email address with the given subject and body'. \
                            Also include an example of the input you plan to send to this function."
                    }
                },
                "required": ["name", "description"]
            }
        }
    })
}
