//! Registration of research students and design groups.

use crate::error::GradeError;
use crate::ids::normalize_id_str;
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Clone, Default)]
pub struct ResearchRegistration {
    pub student_id: String,
    pub student_name: String,
    pub email: String,
    pub supervisor: String,
    pub research_title: String,
    pub abstract_text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
    pub name: String,
    pub student_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct DesignRegistration {
    pub group_name: String,
    pub supervisor: String,
    pub abstract_text: String,
    pub members: Vec<GroupMember>,
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn required(field: &str, value: &str) -> Result<String, GradeError> {
    let t = value.trim();
    if t.is_empty() {
        return Err(GradeError::validation(field, "field is required"));
    }
    Ok(t.to_string())
}

fn check_abstract(text: &str, limit: usize) -> Result<(), GradeError> {
    let words = word_count(text);
    if words > limit {
        return Err(GradeError::validation_with(
            "abstract",
            format!("abstract exceeds {limit} words"),
            json!(words),
        ));
    }
    Ok(())
}

impl ResearchRegistration {
    /// Returns a trimmed copy with the student id normalized.
    pub fn validated(&self, abstract_word_limit: usize) -> Result<Self, GradeError> {
        let student_id = normalize_id_str(&self.student_id);
        if student_id.is_empty() {
            return Err(GradeError::validation("studentId", "field is required"));
        }
        let email = required("email", &self.email)?;
        if !email.contains('@') {
            return Err(GradeError::validation_with(
                "email",
                "not an email address",
                json!(email),
            ));
        }
        let out = Self {
            student_id,
            student_name: required("name", &self.student_name)?,
            email,
            supervisor: required("supervisor", &self.supervisor)?,
            research_title: required("title", &self.research_title)?,
            abstract_text: required("abstract", &self.abstract_text)?,
        };
        check_abstract(&out.abstract_text, abstract_word_limit)?;
        Ok(out)
    }
}

impl DesignRegistration {
    /// Member rows left completely blank are skipped; half-filled rows are
    /// rejected.
    pub fn validated(
        &self,
        abstract_word_limit: usize,
        max_members: usize,
    ) -> Result<Self, GradeError> {
        let group_name = required("groupName", &self.group_name)?;
        let supervisor = required("supervisor", &self.supervisor)?;
        let abstract_text = self.abstract_text.trim().to_string();
        check_abstract(&abstract_text, abstract_word_limit)?;

        let mut members: Vec<GroupMember> = Vec::new();
        for (i, m) in self.members.iter().enumerate() {
            let name = m.name.trim();
            let student_id = normalize_id_str(&m.student_id);
            match (name.is_empty(), student_id.is_empty()) {
                (true, true) => continue,
                (false, false) => {}
                _ => {
                    return Err(GradeError::validation_with(
                        "members",
                        "each member needs both a name and a student id",
                        json!(i),
                    ))
                }
            }
            if members.iter().any(|x| x.student_id == student_id) {
                return Err(GradeError::validation_with(
                    "members",
                    "student listed twice in the group",
                    json!(student_id),
                ));
            }
            members.push(GroupMember {
                name: name.to_string(),
                student_id,
            });
        }

        if members.is_empty() {
            return Err(GradeError::validation("members", "at least one member is required"));
        }
        if members.len() > max_members {
            return Err(GradeError::validation_with(
                "members",
                format!("a group has at most {max_members} members"),
                json!(members.len()),
            ));
        }

        Ok(Self {
            group_name,
            supervisor,
            abstract_text,
            members,
        })
    }
}
