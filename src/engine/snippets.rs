//! Lua helpers injected into the engine once per session
//!
//! Snippet evaluation relies on `evaluate_script_expression`, which runs the
//! expression and posts the result back as a `script_output` message tagged
//! with the caller's correlation id.

/// Helper definitions, each guarded so re-injection is harmless
pub const LUA_HELPERS: [&str; 3] = [
    r#"
if not to_console_string then
    function to_console_string(x)
        local function comp(a, b)
            if type(a) ~= type(b) then
                return type(a) < type(b)
            end
            return a < b
        end

        if type(x) == 'table' then
            local keys = {}
            for k, _ in pairs(x) do
                keys[#keys + 1] = k
            end
            table.sort(keys, comp)
            local s = ''
            for _, k in ipairs(keys) do
                if type(x[k]) == 'string' then
                    s = s .. string.format('%-20s  %q\n', tostring(k), x[k])
                else
                    s = s .. string.format('%-20s  %s\n', tostring(k), tostring(x[k]))
                end
            end
            return s
        elseif type(x) == 'function' then
            local info = debug.getinfo(x)
            if info.what == 'C' then
                return 'C function'
            end
            return 'Lua function, ' .. info.short_src .. ':' .. info.linedefined
        end
        return tostring(x)
    end
end
"#,
    r#"
if not send_script_output then
    function send_script_output(result, requestId)
        local msg = { type = 'script_output' }
        msg.result = to_console_string(result)
        msg.result_type = type(result)
        msg.requestId = requestId
        stingray.Application.console_send(msg)
    end
end
"#,
    r#"
if not evaluate_script_expression then
    function evaluate_script_expression(expression, requestId)
        local script = loadstring('return ' .. expression)
        if script == nil then
            script = loadstring(expression)
        end
        if script == nil then
            send_script_output('syntax error', requestId)
            return
        end
        local ok, result = pcall(script)
        if not ok then
            local msg = { type = 'script_output', requestId = requestId, error = tostring(result) }
            stingray.Application.console_send(msg)
            return
        end
        send_script_output(result, requestId)
    end
end
"#,
];

/// Quote a string as a Lua string literal
pub fn lua_quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\0' => quoted.push_str("\\000"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

/// Script that evaluates `expression` and replies under `request_id`
pub fn evaluate_call(expression: &str, request_id: u64) -> String {
    format!(
        "evaluate_script_expression({}, {})",
        lua_quote(expression),
        request_id
    )
}
