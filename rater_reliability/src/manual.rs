/*!

This is the long-form manual for `rater_reliability` and `raterel`.

## Reliability scores

For every pair of raters that classified at least one common item, the agreement
between both raters is measured with Cohen's kappa over the items they have in common.
When a rater saw an item several times, only the latest classification counts.

The reliability score of a rater is:

```text
reliability = mean(kappa with every other rater) * ln(number of classifications)
```

A few rules apply:
- when both raters of a pair always gave the same single answer, the agreement is purely
  due to chance and kappa is undefined. Undefined coefficients are left out of the average
  (they do not count as 0 or 1).
- a rater who always gives the same answer gets a kappa of 0 with the others. This is a
  defined value and it is averaged like any other.
- a rater with a single classification gets a score of 0 (`ln(1) = 0`).
- raters that share no item with anyone, or whose coefficients are all undefined, do not get
  a score. They are reported separately as excluded raters.

The scale of the score is meaningless: it is meant to rank raters. Ranks are descending
(1 is the most reliable rater). Raters with equal scores share the average of the ranks they
would occupy. With `n` scored raters and a bottom tier fraction `f` (20% by default), the raters
with a rank greater than or equal to `ceil(n * (1 - f))` are flagged as bottom tier. For example,
with 10 raters, the ranks 8, 9 and 10 are flagged.

## Consensus

Each item is resolved independently:
- if a single answer is the most common, it is the final answer.
- otherwise, the raters of the item are sorted by rank, and the answer of the best rater wins.
  The item is marked as conflicted. The ratio between the reliability scores of the two best
  raters is recorded: a low ratio means that raters of similar reliability disagree.
- if the winning answer of a conflicted item is the unknown answer (by default
  `I can't figure this one out.`), the next rater in rank order with an acceptable answer
  (by default `Yes` or `No`) and a rank strictly below the rank ceiling is proposed as the next
  best answer. If there is none, the item is flagged as unresolvable.

Raters without a reliability score never take part in the consensus. Items can be restricted to
retired items: items flagged as retired in the input, or items seen by a minimum number of
distinct raters.

The review queue lists the conflicted items whose top answer is the unknown answer, sorted
by increasing top-two ratio. These are the items to read first.

## Input formats

The following formats are supported by `raterel`:
* `csv` Comma Separated Values, with a header row
* `xlsx` Excel spreadsheet

Both formats expect one row per classification:

```text
User_Name,Image_ID,Match,Class_Date,Retired
anna,deed-1,Yes,2017-10-08 10:00:00,Retired
bob,deed-1,No,2017-10-08 11:30:00,Retired
```

The columns are referenced by their name in the header, or by their position (starting at 1).
The timestamps may be written in RFC 3339, `YYYY-MM-DD HH:MM:SS`, `MM/DD/YYYY HH:MM:SS`,
`YYYY-MM-DD`, or as Excel dates. A custom `chrono` format may also be given.

## Configuration

`raterel` comes with sensible defaults but a project file in JSON gives full control:

```json
{
  "outputSettings": {
    "projectName": "Mapping deeds",
    "projectDate": "2017-11-26",
    "outputDirectory": "output"
  },
  "classificationSources": [
    {
      "provider": "csv",
      "filePath": "placeholder.csv",
      "raterColumn": "User_Name",
      "itemColumn": "Image_ID",
      "answerColumn": "Match",
      "timestampColumn": "Class_Date",
      "retiredColumn": "Retired",
      "retiredLabel": "Retired",
      "nullLabel": "null"
    }
  ],
  "rules": {
    "unknownAnswer": "I can't figure this one out.",
    "acceptableAnswers": ["Yes", "No"],
    "rankCeiling": 1000,
    "retirement": "flagged",
    "bottomTierFraction": 0.2
  }
}
```

Notes:
- `retirement` is one of `all`, `flagged`, `minimumRaters`, `flaggedOrMinimumRaters`. The
  minimum is given by `minimumDistinctRaters`.
- `answerDomain` (array of strings, optional): any answer outside this list stops the program.
- `reliabilitySource` (object with a `filePath`, optional): a reliability table written by a
  previous run. When provided, the scores are not recomputed and only the consensus is run.
- the paths are relative to the directory of the project file.

*/
