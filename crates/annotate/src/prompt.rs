/// Prompt asking the generator for positive entities and hard-negative
/// (real but mislabeled) entities of a passage.
///
/// With an empty `types` slice the generator picks types that occur in the
/// passage; otherwise the given types are offered as the label inventory.
pub fn build_annotation_prompt(text: &str, types: &[String]) -> String {
    let type_rule = if types.is_empty() {
        "- Only use entity types that are supported by the passage itself.".to_string()
    } else {
        format!(
            "- Prefer these entity types where they apply: {}.",
            types.join(", ")
        )
    };

    format!(
        r#"Extract named entities from the passage below AND produce hard negative entities.

INSTRUCTIONS:
1. List every named entity of the passage in "entities", with all types that apply.
2. List hard negatives in "negative_entities": mentions that really occur in the passage,
   each paired with a type that is plausible but WRONG for it.
3. Output ONLY the schema between the <start> and <end> markers.

RULES:
- Entity types are lowercase and may contain several words separated by spaces.
- An entity may carry several types when the context supports them.
- A negative entity's type must differ from every correct type of that mention and should be
  semantically close to it.
- Never invent negative entities that do not occur verbatim in the passage.
{type_rule}

SCHEMA:
<start>
{{
  "entities": [
    {{"entity": "entity text", "types": ["type a", "type b"]}}
  ],
  "negative_entities": [
    {{"entity": "entity text", "types": ["wrong type"]}}
  ]
}}
<end>

Do not add examples, notes or explanations.

PASSAGE: "{text}"
"#
    )
}

/// Serving-time prompt: recognize entities of the given types and return a JSON array.
pub fn build_recognition_prompt(text: &str, types: &[String]) -> String {
    let types = types.join(", ");

    format!(
        r#"You are a named entity recognition system. Extract entities of these types: {types}.

TEXT: "{text}"

For every entity return an object with:
- "text": the exact entity text as it appears in the input
- "label": one of: {types}
- "start": start character position
- "end": end character position
- "score": confidence between 0 and 1

An entity with several applicable types is returned once per type, as separate objects.

EXAMPLE:
[
  {{"text": "John Smith", "label": "person", "start": 0, "end": 10, "score": 0.95}},
  {{"text": "New York", "label": "location", "start": 15, "end": 23, "score": 0.88}}
]

Output ONLY the JSON array, no markdown, no explanations."#
    )
}
