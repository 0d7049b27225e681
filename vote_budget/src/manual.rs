/*!

This is the long-form manual for `vote_budget` and `votebudget`.

## Rules of a round

Every profile receives the same budget of votes (100 by default) and
distributes it across a small, fixed set of candidates. A request for a count
is never refused because of the budget: it is reduced to what the other
candidates leave available. For example, with `A: 30, B: 20` and a budget of
100, asking for `A = 90` gives `A = 80`. Negative requests are treated as zero.

The remaining count is always the budget minus the sum of the counts.

## Command line

```text
votebudget name                               # suggest a random profile name
votebudget register Brave-Otter --pin 1234    # without a name, a random one
votebudget login Brave-Otter --pin 1234
votebudget incr c1                            # one more vote for c1
votebudget decr c1                            # one vote less for c1
votebudget set c2 40                          # set c2 directly (slider)
votebudget status
votebudget submit
votebudget leaderboard --watch --interval 5
votebudget logout
votebudget demo --voters 4                    # a round in memory, no files
```

Changes are kept in a local session file after every command. They only
reach the shared store with `submit`, which replaces all the previously
submitted votes of the profile. Candidates at zero are not stored: no row
means zero votes.

After `login` and after every successful `submit`, the local allocation is
replaced by what the store holds.

## Configuration

`votebudget` comes with defaults (a budget of 100, candidates `c1` to `c5`).
They can be changed with a JSON file passed with `--config`:

```json
{
  "round": { "name": "Spring round", "totalVotes": 100 },
  "candidates": [
    { "id": "c1", "name": "Candidate 1", "profilePic": "https://i.pravatar.cc/150?img=1" },
    { "id": "c2", "name": "Candidate 2", "url": "https://example.com/candidate2" }
  ],
  "storage": {
    "remotePath": "votebudget-store.json",
    "cachePath": "votebudget-session.json"
  }
}
```

All the sections are optional. Relative storage paths are resolved against
the directory of the configuration file. The `--store` and `--cache` flags
take precedence over the `storage` section.

 */
