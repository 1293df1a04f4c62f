// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Multipart form bodies for enrolment requests.

const BOUNDARY: &str = "----enrolment-test-boundary";

/// Builds a `multipart/form-data` body part by part.
///
/// Repeating a field name appends another part; the service keeps the last
/// value, so `valid().text("postalCode", ..)` overrides one field.
#[derive(Debug, Clone, Default)]
pub struct FormBuilder {
    body: Vec<u8>,
}

impl FormBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// All five fields filled with acceptable values.
    pub fn valid() -> Self {
        Self::new()
            .text("consumerName", "Jane Doe")
            .text("consumerNumber", "1234567890123456")
            .text("consumerAddress", "1 Main St")
            .text("postalCode", "560001")
            .text("phoneNumber", "9876543210")
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, filename: &str, content_type: &str, data: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={BOUNDARY}")
    }

    /// Finish the body with the closing boundary.
    pub fn into_body(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        self.body
    }
}
