/// Skeleton of the reply the model is asked for. One `phaseN` key per
/// treatment phase, one `dayN` key per scheduled day inside the cycle.
const REGIMEN_SCHEMA_SKELETON: &str = r#"{
  "phase1": {
    "treatmentTemplate": {
      "cycle": {
        "duration": {"numberOfDays": 21},
        "medications": {
          "day1": {
            "pretreatmentMedications": [
              {"name": "Dexamethasone", "dose": "8mg"}
            ],
            "chemotherapy": [
              {"name": "Docetaxel", "dose": "75mg/m2"}
            ],
            "targetedTherapy": [
              {"name": "Trastuzumab", "dose": "6mg/kg"}
            ]
          }
        }
      }
    }
  }
}"#;

/// Build the extraction prompt for one protocol document.
pub fn build_regimen_prompt(document_text: &str) -> String {
    format!(
        r#"You convert oncology treatment-protocol documents into structured JSON.

RULES — ABSOLUTE, NO EXCEPTIONS:
1. Extract ONLY medications and schedules explicitly stated in the document.
2. NEVER infer drugs, doses, or days that are not directly written.
3. Number phases "phase1", "phase2", ... in the order they appear.
4. Number days "day1", "day2", ... and never exceed the cycle duration.
5. If the cycle duration is not stated, omit the "duration" object entirely.
6. Every medication needs a "name"; include "dose" only when the document states it.
7. Sort each day's medications into "pretreatmentMedications", "chemotherapy",
   and "targetedTherapy"; leave a group out or empty if the day has none.
8. Reply with a single JSON object in exactly this shape and nothing else,
   no prose before or after:

{skeleton}

<document>
{document_text}
</document>"#,
        skeleton = REGIMEN_SCHEMA_SKELETON,
        document_text = document_text
    )
}
