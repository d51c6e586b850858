use crate::predictor::{LabelTable, Prediction};

const TEMPLATE: &str = include_str!("../templates/index.html");

/// What the index page shows besides the upload form.
pub struct PageView<'a> {
    pub labels: &'a LabelTable,
    pub model_name: &'a str,
    pub prediction: Option<&'a Prediction>,
    pub error: Option<&'a str>,
}

impl<'a> PageView<'a> {
    pub fn new(labels: &'a LabelTable, model_name: &'a str) -> Self {
        Self {
            labels,
            model_name,
            prediction: None,
            error: None,
        }
    }

    pub fn with_prediction(mut self, prediction: &'a Prediction) -> Self {
        self.prediction = Some(prediction);
        self
    }

    pub fn with_error(mut self, error: &'a str) -> Self {
        self.error = Some(error);
        self
    }

    pub fn render(&self) -> String {
        fill(TEMPLATE, |key| match key {
            "model_name" => Some(escape_html(self.model_name)),
            "class_list" => Some(self.class_list()),
            "classes_json" => Some(self.classes_json()),
            "error" => Some(self.error.map(escape_html).unwrap_or_default()),
            "result_hidden" => {
                let hidden = if self.prediction.is_some() { "" } else { "hidden" };
                Some(hidden.to_string())
            }
            "predicted_label" => Some(
                self.prediction
                    .map(|p| escape_html(&p.label))
                    .unwrap_or_default(),
            ),
            "prob_rows" => Some(self.prob_rows()),
            _ => None,
        })
    }

    fn class_list(&self) -> String {
        self.labels
            .names()
            .iter()
            .map(|name| format!("<li class=\"tag\">{}</li>", escape_html(name)))
            .collect::<Vec<_>>()
            .join("")
    }

    fn classes_json(&self) -> String {
        serde_json::to_string(self.labels.names())
            .unwrap_or_else(|_| "[]".into())
            .replace('<', "\\u003c")
    }

    /// Probability table rows, most likely class first.
    fn prob_rows(&self) -> String {
        let Some(prediction) = self.prediction else {
            return String::new();
        };
        let mut rows: Vec<(String, f32)> = prediction
            .probs
            .iter()
            .enumerate()
            .map(|(i, &p)| (self.labels.label_for(i), p))
            .collect();
        rows.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        rows.into_iter()
            .map(|(name, p)| format!("<tr><td>{}</td><td>{:.3}</td></tr>", escape_html(&name), p))
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Replaces each `{{key}}` in a single pass, so substituted text is never
/// scanned again. Unknown keys are left as they are.
fn fill<F>(template: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = after[..end].trim();
                match lookup(key) {
                    Some(value) => out.push_str(&value),
                    None => out.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
