//! Auth token injection into XML-RPC method calls.
//!
//! The backend's web-services API authenticates by convention: the first
//! parameter of every method call is the auth token. The gateway owns that
//! token, so callers send their method call without it and the gateway
//! splices it in as a new first `<string>` parameter. Existing parameters
//! are copied through at the event level, so values of any type survive
//! untouched.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InjectError {
    #[error("malformed xml: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("failed to write xml: {0}")]
    Write(#[from] std::io::Error),

    #[error("body is not an xml-rpc method call")]
    NotMethodCall,
}

/// Re-serialize `body` with `token` prepended as a new first string
/// parameter of the method call.
pub fn inject_auth_token(body: &[u8], token: &str) -> Result<Vec<u8>, InjectError> {
    let mut reader = Reader::from_reader(body);
    let mut writer = Writer::new(Vec::new());
    let mut buf = Vec::new();

    let mut saw_method_call = false;
    let mut saw_method_name = false;
    let mut injected = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(e) => {
                let name = e.local_name().as_ref().to_vec();
                writer.write_event(Event::Start(e))?;
                match name.as_slice() {
                    b"methodCall" => saw_method_call = true,
                    b"methodName" => saw_method_name = true,
                    b"params" if saw_method_call && !injected => {
                        write_token_param(&mut writer, token)?;
                        injected = true;
                    }
                    _ => {}
                }
            }
            Event::Empty(e)
                if e.local_name().as_ref() == b"params" && saw_method_call && !injected =>
            {
                // `<params/>` becomes a params element holding only the token.
                writer.write_event(Event::Start(BytesStart::new("params")))?;
                write_token_param(&mut writer, token)?;
                writer.write_event(Event::End(BytesEnd::new("params")))?;
                injected = true;
            }
            Event::End(e) => {
                if e.local_name().as_ref() == b"methodCall" && !injected {
                    // A call with no params element at all.
                    writer.write_event(Event::Start(BytesStart::new("params")))?;
                    write_token_param(&mut writer, token)?;
                    writer.write_event(Event::End(BytesEnd::new("params")))?;
                    injected = true;
                }
                writer.write_event(Event::End(e))?;
            }
            event => writer.write_event(event)?,
        }
        buf.clear();
    }

    if !saw_method_call || !saw_method_name || !injected {
        return Err(InjectError::NotMethodCall);
    }

    Ok(writer.into_inner())
}

fn write_token_param(writer: &mut Writer<Vec<u8>>, token: &str) -> Result<(), std::io::Error> {
    writer.write_event(Event::Start(BytesStart::new("param")))?;
    writer.write_event(Event::Start(BytesStart::new("value")))?;
    writer.write_event(Event::Start(BytesStart::new("string")))?;
    writer.write_event(Event::Text(BytesText::new(token)))?;
    writer.write_event(Event::End(BytesEnd::new("string")))?;
    writer.write_event(Event::End(BytesEnd::new("value")))?;
    writer.write_event(Event::End(BytesEnd::new("param")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param_strings(xml: &[u8]) -> Vec<String> {
        // Collect the text content of each <param>, in document order.
        let mut reader = Reader::from_reader(xml);
        let mut buf = Vec::new();
        let mut params = Vec::new();
        let mut in_param = false;
        let mut current = String::new();
        loop {
            match reader.read_event_into(&mut buf).unwrap() {
                Event::Eof => break,
                Event::Start(e) if e.local_name().as_ref() == b"param" => {
                    in_param = true;
                    current.clear();
                }
                Event::End(e) if e.local_name().as_ref() == b"param" => {
                    in_param = false;
                    params.push(current.clone());
                }
                Event::Text(t) if in_param => {
                    current.push_str(&t.unescape().unwrap());
                }
                _ => {}
            }
            buf.clear();
        }
        params
    }

    #[test]
    fn prepends_token_ahead_of_existing_params() {
        let body = br#"<?xml version="1.0"?>
<methodCall>
  <methodName>api.getPrinterProperty</methodName>
  <params>
    <param><value><string>printer-1</string></value></param>
    <param><value><int>42</int></value></param>
  </params>
</methodCall>"#;

        let out = inject_auth_token(body, "secret-token").unwrap();
        let params = param_strings(&out);
        assert_eq!(params.len(), 3);
        assert_eq!(params[0], "secret-token");
        assert!(params[1].contains("printer-1"));
    }

    #[test]
    fn handles_call_without_params_element() {
        let body = b"<methodCall><methodName>api.ping</methodName></methodCall>";
        let out = inject_auth_token(body, "tok").unwrap();
        let params = param_strings(&out);
        assert_eq!(params, vec!["tok".to_string()]);
    }

    #[test]
    fn handles_self_closing_params() {
        let body = b"<methodCall><methodName>api.ping</methodName><params/></methodCall>";
        let out = inject_auth_token(body, "tok").unwrap();
        let params = param_strings(&out);
        assert_eq!(params, vec!["tok".to_string()]);
    }

    #[test]
    fn preserves_method_name() {
        let body = b"<methodCall><methodName>api.listUserAccounts</methodName><params></params></methodCall>";
        let out = inject_auth_token(body, "tok").unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("<methodName>api.listUserAccounts</methodName>"));
    }

    #[test]
    fn escapes_token_content() {
        let body = b"<methodCall><methodName>api.ping</methodName><params></params></methodCall>";
        let out = inject_auth_token(body, "a<b&c").unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("a&lt;b&amp;c"));
    }

    #[test]
    fn rejects_non_method_call_documents() {
        assert!(inject_auth_token(b"<methodResponse></methodResponse>", "tok").is_err());
        assert!(inject_auth_token(b"not xml at all", "tok").is_err());
        assert!(inject_auth_token(b"<methodCall><methodName>x</methodName>", "tok").is_err());
    }
}
