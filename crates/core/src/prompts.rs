// crates/core/src/prompts.rs

//! Prompts sent to the generator when writing, describing and fixing
//! capabilities.

use serde_json::json;

pub const CODER_SYSTEM_PROMPT: &str = "You are an awesome javascript coding genius";

/// Rules every generated module has to follow.
pub fn code_style(name: &str) -> String {
    format!(
        "- Use ESM syntax with import/export statements. Avoid using require().\n\
         - {name} should accept only one argument, an object with named parameters.\n\
         - The function should throw an error if it can't complete successfully.\n\
         - Favor async/await over callbacks for asynchronous operations.\n\
         - Treat any file paths as relative to current working dir, not relative to the module. Don't use __dirname.\n\
         - Use packages whenever possible. Avoid writing your own code for common tasks.\n\
         - Don't include dummy code or placeholder code. The function should be complete and ready for production use.\n\
         - If the function needs user-specific or environment-specific information, for example a password\n\
         \x20 or an API key for a third-party service, then that should be passed in as parameters to the function,\n\
         \x20 and the assistant should ask the user about this information before calling the function.\n\
         \x20 Don't prompt the user from inside the function, and don't rely on hardcoded values, config files,\n\
         \x20 or environment variables."
    )
}

/// Ask for a module implementing `name`.
pub fn build_implementation_prompt(name: &str, description: &str) -> String {
    format!(
        "Write a JavaScript function named {name}\n\
         based on the following description within triple quotes:\n\
         \"\"\"\n\
         {description}\n\
         \"\"\"\n\n\
         Provide a complete JavaScript module that exports {name}, obeying the following code rules:\n\
         {style}\n\n\
         The final output should be a complete JavaScript module that exports {name}.\n\n\
         Use --- as a delimiter at both the beginning and end of the module.",
        style = code_style(name),
    )
}

/// Follow-up asking for a function spec of the module just written.
pub fn build_spec_prompt() -> String {
    let sample = json!({
        "name": "getWeather",
        "description": "Get the current weather for a city",
        "parameters": {
            "type": "object",
            "properties": {
                "city": {
                    "type": "string",
                    "description": "The city",
                },
            },
            "required": ["city"],
        },
    });
    format!(
        "Create a function spec for the code above.\n\
         It should be formatted as a JSON Schema Object. Here is an example:\n\
         {}\n\n\
         Use --- as delimiter at the beginning and end of the function spec.",
        serde_json::to_string_pretty(&sample).unwrap_or_default()
    )
}

pub const DEBUG_SYSTEM_PROMPT: &str = "You are a master debugger. When you are asked to fix a function, you always return \
a complete new module with the fixed function code. Use --- as a delimiter at both the beginning and end of the module.\n\
If the module is correct and the failure was caused by bad input, return the corrected input instead, \
as a single JSON object with --- as a delimiter at both the beginning and end.\n\
If the failure cannot be fixed by changing the code or the input, explain why in plain text without any --- delimiters.";

/// Everything the generator needs to fix a failing capability.
pub struct DebugContext<'a> {
    pub name: &'a str,
    pub spec: &'a str,
    pub module_code: &'a str,
    pub input: &'a str,
    pub console_output: &'a str,
    pub error: &'a str,
}

pub fn build_debug_prompt(ctx: &DebugContext<'_>) -> String {
    format!(
        "Debug the {name} function.\n\n\
         Here is the function spec:\n\
         {spec}\n\n\
         Here is the complete module:\n\
         ---\n\
         {code}\n\
         ---\n\n\
         I sent the following input:\n\
         ---\n\
         {input}\n\
         ---\n\n\
         Here is the console output:\n\
         ---\n\
         {console}\n\
         ---\n\n\
         I got the following error:\n\
         ---\n\
         {error}\n\
         ---\n\n\
         Please provide a complete new version of this module, where the bug is fixed.\n\
         Make sure the implementation obeys the function spec.\n\n\
         Follow these code rules:\n\
         {style}\n\n\
         If you are unable to determine the cause of the bug, just return the same module\n\
         but with more logging to help you debug it later.\n\n\
         Use --- as a delimiter at both the beginning and end of the module.",
        name = ctx.name,
        spec = ctx.spec,
        code = ctx.module_code,
        input = ctx.input,
        console = if ctx.console_output.is_empty() {
            "(no output)"
        } else {
            ctx.console_output
        },
        error = ctx.error,
        style = code_style(ctx.name),
    )
}
