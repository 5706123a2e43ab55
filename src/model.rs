use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

/// Text-backed enums stored as their lowercase wire name.
macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: UnknownVariant| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

text_enum!(Role, "role", {
    Admin => "admin",
    Teacher => "teacher",
    Student => "student",
});

text_enum!(Gender, "gender", {
    Male => "male",
    Female => "female",
    Other => "other",
});

text_enum!(AttendanceStatus, "attendance status", {
    Present => "present",
    Absent => "absent",
    Leave => "leave",
});

text_enum!(FeeStatus, "fee status", {
    Paid => "paid",
    Unpaid => "unpaid",
});

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    pub id: String,
    pub name: String,
    pub students: BTreeSet<String>,
    pub teachers: BTreeSet<String>,
    pub subjects: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub user_id: String,
    pub roll_number: String,
    pub class_id: Option<String>,
    pub dob: NaiveDate,
    pub address: String,
    pub father_name: String,
    pub gender: Gender,
    pub fees_paid: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: String,
    pub user_id: String,
    pub classes: BTreeSet<String>,
    pub subjects: BTreeSet<String>,
    pub dob: NaiveDate,
    pub address: String,
    pub mobile_no: String,
    pub father_name: String,
    pub gender: Gender,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub classes: BTreeSet<String>,
    pub teachers: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Exam {
    pub id: String,
    pub name: String,
    pub classes: BTreeSet<String>,
    pub subjects: BTreeSet<String>,
    pub date: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendance {
    pub id: String,
    pub student_id: String,
    pub class_id: String,
    pub teacher_id: String,
    pub date: NaiveDateTime,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Fee {
    pub id: String,
    pub student_id: String,
    pub amount: f64,
    pub due_date: NaiveDateTime,
    pub status: FeeStatus,
    pub payment_date: Option<NaiveDateTime>,
}

impl Fee {
    /// Payment month when paid with a recorded payment date, else the due month.
    pub fn effective_date(&self) -> NaiveDateTime {
        match (self.status, self.payment_date) {
            (FeeStatus::Paid, Some(paid_at)) => paid_at,
            _ => self.due_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectMarks {
    pub subject_id: String,
    pub marks_obtained: f64,
    pub total_marks: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamResult {
    pub id: String,
    pub student_id: String,
    pub exam_id: String,
    pub class_id: String,
    pub subjects: Vec<SubjectMarks>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_enums_roundtrip_through_wire_names() {
        assert_eq!("leave".parse::<AttendanceStatus>().ok(), Some(AttendanceStatus::Leave));
        assert_eq!(Role::Teacher.as_str(), "teacher");
        assert!("ADMIN".parse::<Role>().is_err());
        let v = serde_json::to_value(FeeStatus::Unpaid).expect("serialize");
        assert_eq!(v, serde_json::json!("unpaid"));
    }

    #[test]
    fn effective_date_prefers_payment_date_only_when_paid() {
        let due = NaiveDate::from_ymd_opt(2025, 6, 10)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("due");
        let paid_at = NaiveDate::from_ymd_opt(2025, 5, 28)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .expect("paid");
        let mut fee = Fee {
            id: "f".into(),
            student_id: "s".into(),
            amount: 10.0,
            due_date: due,
            status: FeeStatus::Paid,
            payment_date: Some(paid_at),
        };
        assert_eq!(fee.effective_date(), paid_at);
        fee.status = FeeStatus::Unpaid;
        assert_eq!(fee.effective_date(), due);
    }
}
