//! The JavaScript prelude injected ahead of the primary entry script.
//!
//! The prelude keeps a reference to the host's registration function, defines
//! the bridge entry point that the primary script's calls are renamed to, and
//! reassigns the registration identifier to a merging closure:
//!
//! 1. the entry point stores its options as the canonical object;
//! 2. the first registration adopts its options when nothing is stored;
//! 3. later registrations combine function-valued keys with the stored ones
//!    through one combinator, `__bridgeChain` (stored first, same `this` and
//!    arguments), and overwrite everything else;
//! 4. `onLaunch` is wrapped once so the host's pre-launch hook, looked up at
//!    call time, runs first;
//! 5. the merged object is handed to the original registration function.

use crate::config::BridgeConfig;

/// Marker property on the `onLaunch` wrapper, so re-registration unwraps it
/// instead of stacking a second wrapper.
const LAUNCH_MARKER: &str = "__bridgeLaunchInner__";

/// Render the prelude for the configured identifiers.
#[must_use]
pub fn prelude(bridge: &BridgeConfig) -> String {
    let registration = &bridge.registration;
    let entry_point = &bridge.entry_point;
    let host = &bridge.host_global;
    let hook = &bridge.pre_launch_hook;
    let marker = LAUNCH_MARKER;

    format!(
        r#"const __bridgePreRegister = {registration};
let __bridgeOptions = null;
function __bridgeChain(previous, next) {{
  return function (...args) {{
    previous.apply(this, args);
    return next.apply(this, args);
  }};
}}
function {entry_point}(opts) {{
  __bridgeOptions = opts;
}}
{registration} = function (opts) {{
  if (!__bridgeOptions) {{
    __bridgeOptions = opts;
  }}
  const options = __bridgeOptions;
  if (options.onLaunch && Object.prototype.hasOwnProperty.call(options.onLaunch, "{marker}")) {{
    options.onLaunch = options.onLaunch.{marker};
  }}
  if (opts !== options) {{
    Object.keys(opts || {{}}).forEach(function (key) {{
      if (typeof options[key] === "function" && typeof opts[key] === "function") {{
        options[key] = __bridgeChain(options[key], opts[key]);
      }} else {{
        options[key] = opts[key];
      }}
    }});
  }}
  const launch = options.onLaunch;
  const wrapped = function (...args) {{
    if (typeof {host} !== "undefined" && typeof {host}.{hook} === "function") {{
      {host}.{hook}();
    }}
    if (typeof launch === "function") {{
      return launch.apply(this, args);
    }}
  }};
  wrapped.{marker} = launch;
  options.onLaunch = wrapped;
  __bridgePreRegister(options);
}};
"#
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
