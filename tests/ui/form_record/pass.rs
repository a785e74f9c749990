use calmform::form::{FormRecord, FormValues};

#[derive(Clone, calmform::form::FormRecord)]
struct SignupForm {
    email: String,
    age: Option<u32>,
    accepted: bool,
}

fn main() {
    let fields = SignupForm::fields();
    assert_eq!(fields.email().as_str(), "email");
    assert_eq!(fields.accepted().as_str(), "accepted");

    let values = SignupForm {
        email: "a@calm.form".to_string(),
        age: None,
        accepted: true,
    }
    .into_values();
    assert_eq!(values.len(), 3);
    assert!(values.get("age").is_none());

    let decoded = SignupForm::from_values(&values.clone().with("email", "b@calm.form"))
        .expect("record decodes");
    assert_eq!(decoded.email, "b@calm.form");
    assert!(decoded.accepted);

    assert!(SignupForm::from_values(&FormValues::new()).is_err());
}
