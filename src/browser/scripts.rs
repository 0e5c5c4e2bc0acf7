// Page-side scripts
//
// Both transcript sources report to the same binding with messages shaped as
// `{speaker: {name, profilePicture}, text, date, source}`.

/// Binding the transcript sources report to
pub const TRANSCRIPT_BINDING: &str = "meetRecorderTranscript";

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Observe the caption region and report each caption block once it settles
///
/// A block keeps growing while its speaker talks. Each report carries only the
/// words added since the block was last reported, so pauses inside one turn do
/// not repeat earlier text.
pub fn caption_observer(binding: &str, caption_region: &str) -> String {
    format!(
        r#"
const binding = {binding};
const regionSelector = {region};
if (window.__meetRecorderCaptions) {{ return true; }}
window.__meetRecorderCaptions = true;

const pending = new Map();
const sent = new WeakMap();
const SETTLE_MS = 1500;

const unsent = (block, text) => {{
  const previous = sent.get(block) || "";
  if (text === previous) {{ return ""; }}
  return text.startsWith(previous) ? text.slice(previous.length).trim() : text;
}};

const read = (block) => {{
  const img = block.querySelector("img");
  const nameNode = block.querySelector("[data-speaker-name], span");
  const name = nameNode ? nameNode.innerText.trim() : "Unknown";
  let text = block.innerText || "";
  if (nameNode && text.startsWith(nameNode.innerText)) {{
    text = text.slice(nameNode.innerText.length);
  }}
  return {{
    speaker: {{ name, profilePicture: img ? img.src : "" }},
    text: text.trim(),
    date: Date.now(),
    source: "captions",
  }};
}};

const flush = (block) => {{
  const entry = pending.get(block);
  if (!entry) {{ return; }}
  clearTimeout(entry.timer);
  pending.delete(block);
  const text = unsent(block, entry.message.text);
  sent.set(block, entry.message.text);
  if (text) {{ window[binding]({{ ...entry.message, text }}); }}
}};

const touch = (block) => {{
  const previous = pending.get(block);
  if (previous) {{ clearTimeout(previous.timer); }}
  const message = read(block);
  const timer = setTimeout(() => flush(block), SETTLE_MS);
  pending.set(block, {{ message, timer }});
}};

const observer = new MutationObserver(() => {{
  const region = document.querySelector(regionSelector);
  if (!region) {{ return; }}
  const blocks = Array.from(region.children);
  for (const block of pending.keys()) {{
    if (!blocks.includes(block)) {{ flush(block); }}
  }}
  for (const block of blocks) {{
    const current = pending.get(block);
    const text = read(block).text;
    const reported = current ? current.message.text : sent.get(block) || "";
    if (text !== reported) {{ touch(block); }}
  }}
}});
observer.observe(document.body, {{ childList: true, subtree: true, characterData: true }});
return true;
"#,
        binding = js_string(binding),
        region = js_string(caption_region),
    )
}

/// Fallback transcript source using the browser's speech recognition
///
/// The recognizer cannot tell speakers apart, so every entry is attributed to
/// "Speaker".
pub fn speech_recognition(binding: &str) -> String {
    format!(
        r#"
const binding = {binding};
const Recognition = window.SpeechRecognition || window.webkitSpeechRecognition;
if (!Recognition) {{ return false; }}
const recognition = new Recognition();
recognition.continuous = true;
recognition.interimResults = false;
recognition.lang = document.documentElement.lang || "en-US";
recognition.onresult = (event) => {{
  for (let i = event.resultIndex; i < event.results.length; i++) {{
    const result = event.results[i];
    if (!result.isFinal) {{ continue; }}
    window[binding]({{
      speaker: {{ name: "Speaker", profilePicture: "" }},
      text: result[0].transcript.trim(),
      date: Date.now(),
      source: "speech_recognition",
    }});
  }}
}};
recognition.onend = () => {{
  try {{ recognition.start(); }} catch (e) {{}}
}};
recognition.start();
return true;
"#,
        binding = js_string(binding),
    )
}
